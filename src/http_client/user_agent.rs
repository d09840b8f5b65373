//! User agent rotation for outbound requests.

use std::sync::atomic::{AtomicUsize, Ordering};

/// Real browser user agents rotated across requests.
pub const DEFAULT_USER_AGENTS: &[&str] = &[
    // Chrome on Windows
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    // Chrome on Mac
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    // Firefox on Windows
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:133.0) Gecko/20100101 Firefox/133.0",
    // Firefox on Mac
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10.15; rv:133.0) Gecko/20100101 Firefox/133.0",
    // Safari on Mac
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/18.1 Safari/605.1.15",
    // Edge on Windows
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36 Edg/131.0.0.0",
];

/// Round-robin user agent picker. Safe to share between tasks.
#[derive(Debug)]
pub struct UserAgentRotation {
    agents: Vec<String>,
    next: AtomicUsize,
}

impl UserAgentRotation {
    /// Falls back to [`DEFAULT_USER_AGENTS`] when `agents` is empty.
    pub fn new(agents: Vec<String>) -> Self {
        let agents = if agents.is_empty() {
            DEFAULT_USER_AGENTS.iter().map(|s| s.to_string()).collect()
        } else {
            agents
        };
        Self {
            agents,
            next: AtomicUsize::new(0),
        }
    }

    /// Next agent in the rotation.
    pub fn next_agent(&self) -> &str {
        let idx = self.next.fetch_add(1, Ordering::Relaxed) % self.agents.len();
        &self.agents[idx]
    }

    /// Use `override_agent` as-is when present, otherwise rotate.
    pub fn resolve<'a>(&'a self, override_agent: Option<&'a str>) -> &'a str {
        match override_agent {
            Some(agent) => agent,
            None => self.next_agent(),
        }
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}

impl Default for UserAgentRotation {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}
