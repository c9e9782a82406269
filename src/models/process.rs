/// A running process as reported by the OS inspector
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessRecord {
    pub pid: u32,
    pub name: String,
    pub cmdline: String,
}

/// Credentials pulled from a language server command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessHandle {
    pub pid: u32,
    /// Value of `--extension_server_port`, 0 when the flag is missing
    pub extension_port: u16,
    pub csrf_token: String,
}

/// A probed port that answered authenticated requests
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connection {
    pub pid: u32,
    pub port: u16,
    /// Informational `--extension_server_port` value of the process
    pub extension_port: u16,
    pub csrf_token: String,
}
