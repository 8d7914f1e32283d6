//! Emergency number classification and emergency connection roles

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use crate::types::{ConnectionId, PhoneId};

/// How an emergency number must be routed on a given phone
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EmergencyRouting {
    /// Dial through ordinary call setup
    Normal,
    /// Dial with dedicated emergency signaling
    Emergency,
    Unknown,
}

/// Emergency number database
pub trait EmergencyNumberClassifier: Send + Sync {
    fn is_emergency_number(&self, number: &str) -> bool;

    fn is_test_emergency_number(&self, number: &str) -> bool;

    fn routing_for(&self, number: &str, phone: PhoneId) -> EmergencyRouting;
}

/// Fixed emergency number table
#[derive(Debug, Clone, Default)]
pub struct StaticEmergencyNumbers {
    numbers: HashSet<String>,
    test_numbers: HashSet<String>,
    routing: HashMap<(String, PhoneId), EmergencyRouting>,
}

impl StaticEmergencyNumbers {
    pub fn new<I, S>(numbers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            numbers: numbers.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    pub fn with_test_number(mut self, number: impl Into<String>) -> Self {
        self.test_numbers.insert(number.into());
        self
    }

    pub fn with_routing(
        mut self,
        number: impl Into<String>,
        phone: PhoneId,
        routing: EmergencyRouting,
    ) -> Self {
        self.routing.insert((number.into(), phone), routing);
        self
    }
}

impl EmergencyNumberClassifier for StaticEmergencyNumbers {
    fn is_emergency_number(&self, number: &str) -> bool {
        self.numbers.contains(number)
    }

    fn is_test_emergency_number(&self, number: &str) -> bool {
        self.test_numbers.contains(number)
    }

    fn routing_for(&self, number: &str, phone: PhoneId) -> EmergencyRouting {
        if let Some(routing) = self.routing.get(&(number.to_string(), phone)) {
            return *routing;
        }
        if self.numbers.contains(number) || self.test_numbers.contains(number) {
            EmergencyRouting::Emergency
        } else {
            EmergencyRouting::Unknown
        }
    }
}

/// Role a connection can hold while an emergency call is being set up
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EmergencyRole {
    /// The emergency call
    Emergency,
    /// An emergency number dialed through normal routing
    NormalRouting,
    /// A second emergency call placed while the first one is still up
    Alternate,
}

/// At most one connection per role
#[derive(Debug, Clone, Default)]
pub struct EmergencyRoles {
    emergency: Option<ConnectionId>,
    normal_routing: Option<ConnectionId>,
    alternate: Option<ConnectionId>,
}

impl EmergencyRoles {
    fn slot(&mut self, role: EmergencyRole) -> &mut Option<ConnectionId> {
        match role {
            EmergencyRole::Emergency => &mut self.emergency,
            EmergencyRole::NormalRouting => &mut self.normal_routing,
            EmergencyRole::Alternate => &mut self.alternate,
        }
    }

    /// Give `role` to `id`, returning the previous holder
    pub fn assign(&mut self, role: EmergencyRole, id: ConnectionId) -> Option<ConnectionId> {
        self.slot(role).replace(id).filter(|prev| *prev != id)
    }

    pub fn holder(&self, role: EmergencyRole) -> Option<ConnectionId> {
        match role {
            EmergencyRole::Emergency => self.emergency,
            EmergencyRole::NormalRouting => self.normal_routing,
            EmergencyRole::Alternate => self.alternate,
        }
    }

    pub fn roles_of(&self, id: ConnectionId) -> Vec<EmergencyRole> {
        [
            EmergencyRole::Emergency,
            EmergencyRole::NormalRouting,
            EmergencyRole::Alternate,
        ]
        .into_iter()
        .filter(|role| self.holder(*role) == Some(id))
        .collect()
    }

    /// Drop every role held by `id`
    pub fn release(&mut self, id: ConnectionId) -> Vec<EmergencyRole> {
        let roles = self.roles_of(id);
        for role in &roles {
            *self.slot(*role) = None;
        }
        roles
    }

    /// Whether any emergency call is tracked
    pub fn has_emergency_call(&self) -> bool {
        self.emergency.is_some() || self.normal_routing.is_some() || self.alternate.is_some()
    }
}
