//! Named port bindings
//!
//! TigerStyle: Bounded names and counts, two-way index kept in lockstep.
//!
//! Binding a capability to a port name is the only way for an actor to keep
//! it past the message that delivered it. Bindings are persisted with the
//! actor record and are the edges the garbage collector walks.

use crate::capability::{Capability, CapabilityRecord};
use lamport_core::{Error, Result, ACTOR_PORTS_COUNT_MAX, PORT_NAME_LENGTH_BYTES_MAX};
use std::collections::BTreeMap;

/// An actor's persisted name → capability bindings
#[derive(Debug, Default)]
pub struct Ports {
    by_name: BTreeMap<String, Capability>,
    by_cap: BTreeMap<Capability, String>,
}

impl Ports {
    /// Create an empty binding table
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn from_records(records: BTreeMap<String, CapabilityRecord>) -> Self {
        let mut ports = Self::new();
        for (name, record) in records {
            let cap = record.into_capability();
            ports.by_cap.insert(cap, name.clone());
            ports.by_name.insert(name, cap);
        }
        ports
    }

    pub(crate) fn to_records(&self) -> BTreeMap<String, CapabilityRecord> {
        self.by_name
            .iter()
            .map(|(name, cap)| (name.clone(), cap.to_record()))
            .collect()
    }

    /// Bind `cap` under `name`
    ///
    /// The caller has already checked that the capability is held.
    pub(crate) fn bind(&mut self, name: &str, cap: Capability) -> Result<()> {
        if name.len() > PORT_NAME_LENGTH_BYTES_MAX {
            return Err(Error::PortNameTooLong {
                length: name.len(),
                limit: PORT_NAME_LENGTH_BYTES_MAX,
            });
        }
        if self.by_cap.contains_key(&cap) {
            return Err(Error::CapabilityAlreadyBound {
                dest_id: cap.dest_id().to_hex(),
                tag: cap.tag(),
            });
        }
        if self.by_name.contains_key(name) {
            return Err(Error::PortNameAlreadyBound {
                name: name.to_string(),
            });
        }
        if self.by_name.len() >= ACTOR_PORTS_COUNT_MAX {
            return Err(Error::TooManyPorts {
                count: self.by_name.len() + 1,
                limit: ACTOR_PORTS_COUNT_MAX,
            });
        }

        self.by_name.insert(name.to_string(), cap);
        self.by_cap.insert(cap, name.to_string());
        debug_assert_eq!(self.by_name.len(), self.by_cap.len());
        Ok(())
    }

    /// Remove the binding for `name`
    pub(crate) fn unbind(&mut self, name: &str) -> Result<Capability> {
        let cap = self.by_name.remove(name).ok_or_else(|| Error::PortNotFound {
            name: name.to_string(),
        })?;
        self.by_cap.remove(&cap);
        debug_assert_eq!(self.by_name.len(), self.by_cap.len());
        Ok(cap)
    }

    /// Capability bound under `name`
    pub fn get(&self, name: &str) -> Option<Capability> {
        self.by_name.get(name).copied()
    }

    /// Whether the capability is bound under any name
    pub fn is_bound(&self, cap: &Capability) -> bool {
        self.by_cap.contains_key(cap)
    }

    /// Number of bindings
    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    /// Whether no port is bound
    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    /// Iterate bindings in name order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Capability)> {
        self.by_name.iter().map(|(name, cap)| (name.as_str(), cap))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lamport_core::ActorId;

    fn cap(b: u8, tag: u64) -> Capability {
        Capability::new(ActorId::from_bytes([b; 32]), tag)
    }

    #[test]
    fn test_bind_and_unbind() {
        let mut ports = Ports::new();
        ports.bind("child", cap(1, 0)).unwrap();

        assert_eq!(ports.get("child"), Some(cap(1, 0)));
        assert!(ports.is_bound(&cap(1, 0)));

        let released = ports.unbind("child").unwrap();
        assert_eq!(released, cap(1, 0));
        assert!(!ports.is_bound(&cap(1, 0)));
        assert!(ports.is_empty());
    }

    #[test]
    fn test_bind_conflicts() {
        let mut ports = Ports::new();
        ports.bind("a", cap(1, 0)).unwrap();

        assert!(matches!(
            ports.bind("b", cap(1, 0)),
            Err(Error::CapabilityAlreadyBound { .. })
        ));
        assert!(matches!(
            ports.bind("a", cap(2, 0)),
            Err(Error::PortNameAlreadyBound { .. })
        ));
        // Same destination, different tag is a different capability
        ports.bind("b", cap(1, 1)).unwrap();
        assert_eq!(ports.len(), 2);
    }

    #[test]
    fn test_unbind_missing_port() {
        let mut ports = Ports::new();
        assert!(matches!(
            ports.unbind("nope"),
            Err(Error::PortNotFound { .. })
        ));
    }

    #[test]
    fn test_port_name_limit() {
        let mut ports = Ports::new();
        let long = "x".repeat(PORT_NAME_LENGTH_BYTES_MAX + 1);
        assert!(matches!(
            ports.bind(&long, cap(1, 0)),
            Err(Error::PortNameTooLong { .. })
        ));
    }

    #[test]
    fn test_records_roundtrip() {
        let mut ports = Ports::new();
        ports.bind("left", cap(1, 3)).unwrap();
        ports.bind("right", cap(2, 4)).unwrap();

        let restored = Ports::from_records(ports.to_records());
        assert_eq!(restored.get("left"), Some(cap(1, 3)));
        assert!(restored.is_bound(&cap(2, 4)));
        assert_eq!(
            restored.iter().map(|(n, _)| n).collect::<Vec<_>>(),
            vec!["left", "right"]
        );
    }
}
