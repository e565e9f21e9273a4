pub mod test_backend;
