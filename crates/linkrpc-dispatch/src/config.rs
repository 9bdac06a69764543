/// Default device id used as `src` of outgoing frames.
pub const DEFAULT_ID: &str = "device";

/// Default realm expected in `auth` assertions.
pub const DEFAULT_AUTH_DOMAIN: &str = "linkrpc";

/// Dispatcher configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatcherConfig {
    /// This device's id. Frames addressed to it are accepted.
    pub id: String,
    /// Capacity of the outgoing queue. 0 disables queueing.
    pub max_queue_length: usize,
    /// Capacity of the pending-request table. Values below 1 act as 1.
    pub max_pending_requests: usize,
    /// Realm expected in digest `auth` assertions.
    pub auth_domain: String,
}

impl DispatcherConfig {
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_max_queue_length(mut self, len: usize) -> Self {
        self.max_queue_length = len;
        self
    }

    pub fn with_max_pending_requests(mut self, len: usize) -> Self {
        self.max_pending_requests = len;
        self
    }

    pub fn with_auth_domain(mut self, domain: impl Into<String>) -> Self {
        self.auth_domain = domain.into();
        self
    }
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            id: DEFAULT_ID.to_string(),
            max_queue_length: 25,
            max_pending_requests: 25,
            auth_domain: DEFAULT_AUTH_DOMAIN.to_string(),
        }
    }
}
