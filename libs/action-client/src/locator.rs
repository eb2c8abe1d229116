//! Application addressing.
//!
//! The orchestrator deploys one charm application per VDU of each network
//! service member. Its runtime name is derived from the network service
//! record name, the member index and the VDU id:
//!
//! ```text
//! format(nsr, member_index, vdu)[..48] + "-" + base26(member_index - 1)
//! ```
//!
//! Application names may only contain lowercase letters and single dashes,
//! so digits are spelled as letters (`0 -> a`, `1 -> b`, ...).

use serde::{Deserialize, Serialize};

use crate::error::LocatorError;

/// Maximum length of the formatted part of an application name.
const MAX_BASE_LEN: usize = 48;

/// Highest member index the two-letter suffix can encode.
pub const MAX_MEMBER_INDEX: u32 = 26 * 26;

/// Identifies one managed application within a network service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ApplicationLocator {
    /// Network service record name (`nsr-name`).
    pub service_instance_id: String,

    /// Virtual deployment unit id.
    pub vdu_id: String,

    /// 1-based member index of the VNF within the service.
    pub member_index: u32,
}

impl ApplicationLocator {
    /// Create a new locator.
    pub fn new(
        service_instance_id: impl Into<String>,
        vdu_id: impl Into<String>,
        member_index: u32,
    ) -> Self {
        Self {
            service_instance_id: service_instance_id.into(),
            vdu_id: vdu_id.into(),
            member_index,
        }
    }

    /// Returns true if `index` can be encoded in an application name.
    pub fn valid_member_index(index: u32) -> bool {
        (1..=MAX_MEMBER_INDEX).contains(&index)
    }

    /// Derive the runtime application name for this locator.
    pub fn application_name(&self) -> Result<String, LocatorError> {
        if self.service_instance_id.trim().is_empty() {
            return Err(LocatorError::EmptyField("service_instance_id"));
        }
        if self.vdu_id.trim().is_empty() {
            return Err(LocatorError::EmptyField("vdu_id"));
        }
        if !Self::valid_member_index(self.member_index) {
            return Err(LocatorError::InvalidMemberIndex(self.member_index));
        }

        let member = self.member_index.to_string();
        let mut name = format_application_name(&[&self.service_instance_id, &member, &self.vdu_id]);
        // Only ASCII survives formatting, so byte truncation is safe. A cut
        // that ends on a dash keeps it: the deployed name has `--` there.
        name.truncate(MAX_BASE_LEN);

        let index = self.member_index - 1;
        name.push('-');
        name.push(letter(index / 26));
        name.push(letter(index % 26));

        Ok(name)
    }
}

impl std::fmt::Display for ApplicationLocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/{}/{}",
            self.service_instance_id, self.vdu_id, self.member_index
        )
    }
}

/// Join `parts` with dashes and rewrite the result into application-name form.
///
/// Digits become letters, any other non-letter becomes a dash, everything is
/// lowercased and runs of dashes collapse into one.
pub fn format_application_name(parts: &[&str]) -> String {
    let joined = parts.join("-");
    let mut name = String::with_capacity(joined.len());

    for c in joined.chars() {
        let mapped = match c.to_digit(10) {
            Some(d) => letter(d),
            None if c.is_ascii_alphabetic() => c.to_ascii_lowercase(),
            None => '-',
        };
        if mapped == '-' && name.ends_with('-') {
            continue;
        }
        name.push(mapped);
    }

    name
}

fn letter(n: u32) -> char {
    char::from(b'a' + (n % 26) as u8)
}
