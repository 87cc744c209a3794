//! Bulk-copy destination writing into a directory table over a Postgres connection.

use std::io::BufReader;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use config::shared::{IntoConnectOptions, PgConnectionConfig};
use futures::SinkExt;
use futures::future::join_all;
use pg_escape::{quote_identifier, quote_literal};
use rustls::ClientConfig;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_postgres::tls::MakeTlsConnect;
use tokio_postgres::{Client, Config, Connection, CopyInSink, NoTls, Socket};
use tokio_postgres_rustls::MakeRustlsConnect;
use tracing::{Instrument, debug, error, info};

use crate::destination::Destination;
use crate::error::{ErrorKind, LoadError, LoadResult};

/// Size of the chunks a file is streamed in.
const COPY_CHUNK_SIZE: usize = 1024 * 1024;

/// Spawns a background task to drive a Postgres connection until it terminates.
fn spawn_postgres_connection<T>(connection: Connection<Socket, T::Stream>, connection_id: usize)
where
    T: MakeTlsConnect<Socket>,
    T::Stream: Send + 'static,
{
    let span = tracing::Span::current();
    let task = async move {
        match connection.await {
            Err(err) => error!(
                connection_id,
                "an error occurred during the postgres connection: {}", err
            ),
            Ok(()) => debug!(connection_id, "postgres connection terminated successfully"),
        }
    }
    .instrument(span);

    // The connection stops as soon as its `Client` is dropped, so the handle is not kept.
    tokio::spawn(task);
}

/// Quotes a possibly schema-qualified table name.
fn quote_table_name(table: &str) -> String {
    match table.split_once('.') {
        Some((schema, name)) => {
            format!("{}.{}", quote_identifier(schema), quote_identifier(name))
        }
        None => quote_identifier(table).into_owned(),
    }
}

/// Builds the `COPY` statement that stores one file in a directory table.
fn copy_statement(table: &str, destination: &str, tag: Option<&str>) -> String {
    let mut statement = format!(
        "copy binary {} from stdin {}",
        quote_table_name(table),
        quote_literal(destination)
    );

    if let Some(tag) = tag {
        statement.push_str(&format!(" with tag {}", quote_literal(tag)));
    }

    statement
}

/// Builds the rustls client configuration trusting the configured root certificates.
fn tls_client_config(pg_connection_config: &PgConnectionConfig) -> LoadResult<ClientConfig> {
    let mut root_store = rustls::RootCertStore::empty();
    let mut root_certs_reader =
        BufReader::new(pg_connection_config.tls.trusted_root_certs.as_bytes());
    for cert in rustls_pemfile::certs(&mut root_certs_reader) {
        let cert = cert.map_err(|err| LoadError::from(err).with_kind(ErrorKind::EncryptionError))?;
        root_store.add(cert)?;
    }

    let provider = Arc::new(rustls::crypto::aws_lc_rs::default_provider());
    let tls_config = ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()?
        .with_root_certificates(root_store)
        .with_no_client_auth();

    Ok(tls_config)
}

/// A [`Destination`] that stores files in a directory table with `COPY ... FROM STDIN`.
///
/// Every instance owns its own connection.
#[derive(Debug)]
pub struct PgDestination {
    client: Client,
    table: String,
    tag: Option<String>,
}

impl PgDestination {
    /// Wraps an established client. Files are stored in `table`, optionally tagged with `tag`.
    pub fn new(client: Client, table: impl Into<String>, tag: Option<String>) -> Self {
        Self {
            client,
            table: table.into(),
            tag,
        }
    }
}

impl Destination for PgDestination {
    fn name() -> &'static str {
        "postgres"
    }

    async fn copy_file<R>(&mut self, mut reader: R, destination: &str) -> LoadResult<u64>
    where
        R: AsyncRead + Unpin + Send,
    {
        let statement = copy_statement(&self.table, destination, self.tag.as_deref());
        let sink: CopyInSink<Bytes> = self.client.copy_in(statement.as_str()).await?;
        let mut sink = std::pin::pin!(sink);

        let mut buffer = BytesMut::with_capacity(COPY_CHUNK_SIZE);
        let mut bytes_sent = 0u64;
        loop {
            buffer.reserve(COPY_CHUNK_SIZE);

            // Dropping the sink on a read error aborts the copy on the server.
            let read = reader
                .read_buf(&mut buffer)
                .await
                .map_err(|err| LoadError::from(err).with_kind(ErrorKind::SourceReadFailed))?;
            if read == 0 {
                break;
            }

            bytes_sent += read as u64;
            if buffer.len() >= COPY_CHUNK_SIZE {
                sink.send(buffer.split().freeze()).await?;
            }
        }

        if !buffer.is_empty() {
            sink.send(buffer.split().freeze()).await?;
        }

        sink.as_mut().finish().await?;

        debug!(destination, bytes_sent, "file copied into directory table");

        Ok(bytes_sent)
    }
}

/// Opens one connection without TLS.
async fn connect_no_tls(config: Config, connection_id: usize) -> LoadResult<Client> {
    let (client, connection) = config.connect(NoTls).await?;
    spawn_postgres_connection::<NoTls>(connection, connection_id);

    debug!(connection_id, "successfully connected to postgres without tls");

    Ok(client)
}

/// Opens one connection encrypted with rustls.
async fn connect_tls(
    config: Config,
    tls: MakeRustlsConnect,
    connection_id: usize,
) -> LoadResult<Client> {
    let (client, connection) = config.connect(tls).await?;
    spawn_postgres_connection::<MakeRustlsConnect>(connection, connection_id);

    debug!(connection_id, "successfully connected to postgres with tls");

    Ok(client)
}

/// Opens `count` connections concurrently and wraps each into a [`PgDestination`].
///
/// Fails as a whole if any connection cannot be established; the connections that did open
/// are closed again. All failures are reported together.
pub async fn connect_destinations(
    pg_connection_config: &PgConnectionConfig,
    table: &str,
    tag: Option<&str>,
    count: usize,
) -> LoadResult<Vec<PgDestination>> {
    let config: Config = pg_connection_config.with_db();
    let tls = if pg_connection_config.tls.enabled {
        Some(MakeRustlsConnect::new(tls_client_config(pg_connection_config)?))
    } else {
        None
    };

    let connections = (0..count).map(|connection_id| {
        let config = config.clone();
        let tls = tls.clone();
        async move {
            match tls {
                Some(tls) => connect_tls(config, tls, connection_id).await,
                None => connect_no_tls(config, connection_id).await,
            }
        }
    });

    let mut clients = Vec::with_capacity(count);
    let mut errors = Vec::new();
    for result in join_all(connections).await {
        match result {
            Ok(client) => clients.push(client),
            Err(err) => errors.push(err),
        }
    }

    if !errors.is_empty() {
        error!(
            failed = errors.len(),
            requested = count,
            "could not open all destination connections"
        );
        return Err(errors.into());
    }

    info!(
        connections = count,
        host = %pg_connection_config.host,
        port = pg_connection_config.port,
        database = %pg_connection_config.name,
        tls = pg_connection_config.tls.enabled,
        "destination connections established"
    );

    Ok(clients
        .into_iter()
        .map(|client| PgDestination::new(client, table, tag.map(str::to_string)))
        .collect())
}
