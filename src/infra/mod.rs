pub mod csv_sink;
pub mod git_publisher;
pub mod http_provider;
