mod partition_tests;
mod property_tests;
mod test_support;
