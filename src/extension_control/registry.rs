use super::record::{ExtensionRecord, ExtensionState};
use crate::devices::Target;
use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use std::sync::{Arc, Mutex, MutexGuard};

/// Identifies one in-flight operation as `host:port:rpmFile`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ExtensionKey {
    host: String,
    port: u16,
    rpm_file: String,
}

impl ExtensionKey {
    pub fn new(target: &Target, rpm_file: impl Into<String>) -> Self {
        Self {
            host: target.host.clone(),
            port: target.port,
            rpm_file: rpm_file.into(),
        }
    }

    pub fn rpm_file(&self) -> &str {
        &self.rpm_file
    }

    pub fn belongs_to(&self, target: &Target) -> bool {
        self.host == target.host && self.port == target.port
    }
}

impl Display for ExtensionKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}", self.host, self.port, self.rpm_file)
    }
}

/// Shared registry of in-flight installations. A key can be claimed by at most
/// one operation at a time, and removing a key is how concurrent requests
/// cancel the pipeline that holds its claim.
#[derive(Debug, Clone, Default)]
pub struct InFlightRegistry {
    records: Arc<Mutex<HashMap<ExtensionKey, ExtensionRecord>>>,
}

impl InFlightRegistry {
    /// Atomically claims a key, inserting the given record. When the key is
    /// already taken the existing record is returned instead.
    pub fn try_claim(
        &self,
        key: ExtensionKey,
        record: ExtensionRecord,
    ) -> Result<InFlightClaim, ExtensionRecord> {
        let mut records = self.lock();
        if let Some(existing) = records.get(&key) {
            return Err(existing.clone());
        }
        records.insert(key.clone(), record);
        Ok(InFlightClaim {
            key,
            registry: self.clone(),
        })
    }

    /// Removes a record, cancelling the pipeline holding its claim.
    pub fn remove(&self, key: &ExtensionKey) -> Option<ExtensionRecord> {
        self.lock().remove(key)
    }

    pub fn get(&self, key: &ExtensionKey) -> Option<ExtensionRecord> {
        self.lock().get(key).cloned()
    }

    /// Snapshot of the records addressing one target, ordered by file name.
    pub fn records_for_target(&self, target: &Target) -> Vec<ExtensionRecord> {
        let records = self.lock();
        let mut snapshot: Vec<(&ExtensionKey, &ExtensionRecord)> = records
            .iter()
            .filter(|(key, _)| key.belongs_to(target))
            .collect();
        snapshot.sort_by(|(a, _), (b, _)| a.rpm_file.cmp(&b.rpm_file));
        snapshot.into_iter().map(|(_, record)| record.clone()).collect()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ExtensionKey, ExtensionRecord>> {
        self.records
            .lock()
            .expect("failed to acquire the in-flight registry lock")
    }
}

/// Exclusive hold on one registry key. The installation pipeline publishes its
/// progress through the claim, and every commit re-checks that the key is
/// still present so a concurrent removal stops the pipeline at the next stage
/// boundary.
#[derive(Debug)]
pub struct InFlightClaim {
    key: ExtensionKey,
    registry: InFlightRegistry,
}

impl InFlightClaim {
    pub fn key(&self) -> &ExtensionKey {
        &self.key
    }

    /// Commits the next state. Returns false when the record was removed (the
    /// operation is cancelled) or the transition is not legal, in which case
    /// nothing is written.
    pub fn advance(&self, next: ExtensionState) -> bool {
        let mut records = self.registry.lock();
        match records.get_mut(&self.key) {
            Some(record) if record.state.may_transition_to(next) => {
                record.state = next;
                true
            }
            _ => false,
        }
    }

    /// Marks the record failed and appends an error tag. The failed record
    /// stays visible until a later request removes it. Returns false when the
    /// record was already removed.
    pub fn fail(&self, message: &str) -> bool {
        let mut records = self.registry.lock();
        match records.get_mut(&self.key) {
            Some(record) if record.state.may_transition_to(ExtensionState::Error) => {
                record.tag_error(message);
                true
            }
            _ => false,
        }
    }

    /// Removes the record, ending the operation.
    pub fn release(self) -> Option<ExtensionRecord> {
        self.registry.remove(&self.key)
    }
}
