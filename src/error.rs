use thiserror::Error;

/// Why no usable language server connection was found
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DiscoveryError {
    #[error("no language server process with a csrf token is running")]
    NoProcess,
    #[error("process {pid} is not listening on any TCP port")]
    NoListeningPorts { pid: u32 },
    #[error("none of the listening ports of process {pid} answered ({ports:?})")]
    NoWorkingPort { pid: u32, ports: Vec<u16> },
}
