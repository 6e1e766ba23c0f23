mod echo;
mod http;
mod shell;

pub use echo::EchoBackend;
pub use http::HttpBackend;
pub use shell::ShellBackend;
