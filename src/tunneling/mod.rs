pub(crate) mod acceptor;
pub(crate) mod handler;
pub(crate) mod session;
pub(crate) mod tunnel;
pub(crate) mod tunnel_runner;
