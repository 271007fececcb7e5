use std::sync::OnceLock;

/// Process- and thread-identifying values injected into the pipeline.
pub trait ProcessIdentity: Send + Sync {
    /// Identifier that stays unique across processes and hosts.
    fn global_pid(&self) -> String;

    /// Name of the thread currently formatting an entry.
    fn thread_name(&self) -> String;
}

/// Default identity: `<hostname>-<pid>` for the global pid and the std
/// thread name (or id) for threads.
#[derive(Debug, Default)]
pub struct HostIdentity {
    global_pid: OnceLock<String>,
}

impl HostIdentity {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProcessIdentity for HostIdentity {
    fn global_pid(&self) -> String {
        self.global_pid
            .get_or_init(|| {
                let host = std::env::var("HOSTNAME")
                    .ok()
                    .filter(|h| !h.is_empty())
                    .unwrap_or_else(|| "localhost".to_string());
                format!("{}-{}", host, std::process::id())
            })
            .clone()
    }

    fn thread_name(&self) -> String {
        let current = std::thread::current();
        match current.name() {
            Some(name) => name.to_string(),
            None => format!("{:?}", current.id()),
        }
    }
}

/// Fixed values, for tests and for hosts that assign their own ids.
#[derive(Debug, Clone)]
pub struct StaticIdentity {
    pub global_pid: String,
    pub thread_name: String,
}

impl ProcessIdentity for StaticIdentity {
    fn global_pid(&self) -> String {
        self.global_pid.clone()
    }

    fn thread_name(&self) -> String {
        self.thread_name.clone()
    }
}
