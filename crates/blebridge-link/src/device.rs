/// A wireless endpoint we can attempt to connect to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceCandidate {
    /// Hardware address, the identity used for de-duplication.
    pub address: String,
    /// Human-readable name, when the platform reports one.
    pub name: Option<String>,
}

impl DeviceCandidate {
    pub fn new(address: impl Into<String>, name: Option<&str>) -> Self {
        Self {
            address: address.into(),
            name: name.map(str::to_owned),
        }
    }
}

/// Prioritized connection candidates: most-recently-connected peers
/// first, then discovery results, de-duplicated by address.
///
/// [`next`] walks the list in priority order and wraps to the front once
/// exhausted; the owner decides when a full fruitless round means
/// discovery should run again.
///
/// [`next`]: CandidateQueue::next
#[derive(Debug, Default)]
pub struct CandidateQueue {
    entries: Vec<DeviceCandidate>,
    cursor: usize,
}

impl CandidateQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a discovery result unless its address is already known.
    pub fn push_discovered(&mut self, candidate: DeviceCandidate) {
        if !self.contains(&candidate.address) {
            self.entries.push(candidate);
        }
    }

    /// Promote a successfully connected peer to the front of the list
    /// and restart the walk there.
    pub fn mark_connected(&mut self, candidate: &DeviceCandidate) {
        self.entries.retain(|c| c.address != candidate.address);
        self.entries.insert(0, candidate.clone());
        self.cursor = 0;
    }

    /// The next candidate to try, wrapping to the front when exhausted.
    pub fn next(&mut self) -> Option<DeviceCandidate> {
        if self.entries.is_empty() {
            return None;
        }
        if self.cursor >= self.entries.len() {
            self.cursor = 0;
        }
        let candidate = self.entries[self.cursor].clone();
        self.cursor += 1;
        Some(candidate)
    }

    pub fn contains(&self, address: &str) -> bool {
        self.entries.iter().any(|c| c.address == address)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
