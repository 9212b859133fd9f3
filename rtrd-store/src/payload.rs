//! Deliverable routing objects.
//!
//! A [`Payload`] is one unit of routing security data a cache hands to
//! its clients: a validated ROA payload, a BGPsec router key or an ASPA
//! record. Every payload carries an announce/withdraw flag so the same
//! type can express both snapshot members and diff entries.

use std::fmt;
use std::net::IpAddr;

/// Whether an object is being announced or withdrawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flag {
    Added,
    Removed,
}

impl Flag {
    pub fn from_wire(flags: u8) -> Self {
        if flags & 1 == 1 {
            Flag::Added
        } else {
            Flag::Removed
        }
    }

    pub fn to_wire(self) -> u8 {
        match self {
            Flag::Added => 1,
            Flag::Removed => 0,
        }
    }
}

/// Address family of an ASPA record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Afi {
    Ipv4,
    Ipv6,
}

impl Afi {
    pub fn to_wire(self) -> u8 {
        match self {
            Afi::Ipv4 => 0,
            Afi::Ipv6 => 1,
        }
    }

    pub fn from_wire(afi: u8) -> Self {
        if afi == 0 {
            Afi::Ipv4
        } else {
            Afi::Ipv6
        }
    }
}

/// A validated ROA payload: prefix, maximum length, origin AS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteOrigin {
    pub prefix: IpAddr,
    pub prefix_len: u8,
    pub max_len: u8,
    pub asn: u32,
    pub flag: Flag,
}

/// A BGPsec router key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouterKey {
    pub ski: [u8; 20],
    pub asn: u32,
    pub spki: Vec<u8>,
    pub flag: Flag,
}

/// An ASPA record: customer AS with its ordered provider set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Aspa {
    pub afi: Afi,
    pub customer_asn: u32,
    pub providers: Vec<u32>,
    pub flag: Flag,
}

/// Any object the cache can deliver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Origin(RouteOrigin),
    Key(RouterKey),
    Aspa(Aspa),
}

impl Payload {
    /// Distinguishes the variants in logs and equality checks.
    pub fn type_tag(&self) -> &'static str {
        match self {
            Payload::Origin(_) => "VRP",
            Payload::Key(_) => "BGPsecKey",
            Payload::Aspa(_) => "ASPA",
        }
    }

    /// A stable fingerprint of the object's content.
    ///
    /// The flag does not participate: an announced and a withdrawn copy
    /// of the same object fingerprint identically, which is what diff
    /// computation keys on.
    pub fn key(&self) -> String {
        match self {
            Payload::Origin(o) => {
                format!("{}/{}-{}-{}", o.prefix, o.prefix_len, o.max_len, o.asn)
            }
            Payload::Key(k) => format!("{}-{}-{}", k.asn, hex(&k.ski), hex(&k.spki)),
            Payload::Aspa(a) => format!(
                "{}-{}-{:?}",
                a.customer_asn,
                a.afi.to_wire(),
                a.providers
            ),
        }
    }

    pub fn flag(&self) -> Flag {
        match self {
            Payload::Origin(o) => o.flag,
            Payload::Key(k) => k.flag,
            Payload::Aspa(a) => a.flag,
        }
    }

    pub fn set_flag(&mut self, flag: Flag) {
        match self {
            Payload::Origin(o) => o.flag = flag,
            Payload::Key(k) => k.flag = flag,
            Payload::Aspa(a) => a.flag = flag,
        }
    }

    /// Content equality, ignoring the announce/withdraw flag.
    pub fn content_eq(&self, other: &Payload) -> bool {
        self.type_tag() == other.type_tag() && self.key() == other.key()
    }
}

impl fmt::Display for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Payload::Origin(o) => write!(
                f,
                "VRP {}/{} -> /{}, AS{}, flags: {}",
                o.prefix,
                o.prefix_len,
                o.max_len,
                o.asn,
                o.flag.to_wire()
            ),
            Payload::Key(k) => write!(
                f,
                "BGPsec AS{} -> {}, flags: {}",
                k.asn,
                hex(&k.ski),
                k.flag.to_wire()
            ),
            Payload::Aspa(a) => write!(
                f,
                "ASPA AS{} -> {:?}, flags: {}",
                a.customer_asn,
                a.providers,
                a.flag.to_wire()
            ),
        }
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
