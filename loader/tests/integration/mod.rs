mod driver_test;
mod pool_test;
