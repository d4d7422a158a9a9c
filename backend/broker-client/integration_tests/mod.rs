mod close;
mod frames;
mod helpers;
mod publish;
mod reconnect;
mod subscribe;
#[cfg(unix)]
mod unix_socket;
