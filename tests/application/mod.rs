mod device_connection_test;
mod hub_test;
