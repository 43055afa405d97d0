use crate::core::ResolveError;
use byteorder::{ReadBytesExt, WriteBytesExt};
use std::fmt;
use std::fmt::Display;
use std::io::{Read, Seek, SeekFrom};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

/// A domain name made up of lower-cased labels.
///
/// Names parsed from user input may be relative (no trailing `.`), in which case
/// they can be qualified with `to_fqdn` or with a search domain via `append`.
/// Names read from the wire are always fully qualified.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Name {
    labels: Vec<Vec<u8>>,
    fqdn: bool,
}

impl Name {
    const MAX_LENGTH: usize = 255;
    const MAX_LABEL_LENGTH: usize = 63;
    const MAX_POINTERS: u32 = 64;

    pub fn root() -> Self {
        Name {
            labels: Vec::new(),
            fqdn: true,
        }
    }

    /// Build the name used for reverse (PTR) lookups of an IPv4 or IPv6 address,
    /// e.g. `4.4.8.8.in-addr.arpa.` for `8.8.4.4`.
    pub fn reverse(addr: IpAddr) -> Self {
        match addr {
            IpAddr::V4(a) => Self::reverse_v4(a),
            IpAddr::V6(a) => Self::reverse_v6(a),
        }
    }

    /// Build the reversed form of an address under an arbitrary zone instead of the
    /// usual `in-addr.arpa.` or `ip6.arpa.`, e.g. `2.0.0.127.zen.example.` for a
    /// lookup of `127.0.0.2` in the `zen.example.` DNS block list.
    pub fn reverse_in(addr: IpAddr, zone: &Name) -> Result<Self, ResolveError> {
        let mut name = Self::reverse(addr);
        // Drop the trailing `in-addr.arpa` or `ip6.arpa` labels.
        name.labels.truncate(name.labels.len() - 2);
        name.fqdn = false;
        name.append(&zone.clone().to_fqdn())
    }

    fn reverse_v4(addr: Ipv4Addr) -> Self {
        let mut labels: Vec<Vec<u8>> = addr.octets().iter().rev().map(|o| o.to_string().into_bytes()).collect();
        labels.push(b"in-addr".to_vec());
        labels.push(b"arpa".to_vec());
        Name { labels, fqdn: true }
    }

    fn reverse_v6(addr: Ipv6Addr) -> Self {
        let mut labels = Vec::with_capacity(34);
        for octet in addr.octets().iter().rev() {
            labels.push(format!("{:x}", octet & 0x0f).into_bytes());
            labels.push(format!("{:x}", octet >> 4).into_bytes());
        }
        labels.push(b"ip6".to_vec());
        labels.push(b"arpa".to_vec());
        Name { labels, fqdn: true }
    }

    pub fn size(&self) -> usize {
        self.labels.iter().map(|l| l.len()).sum::<usize>() + self.labels.len() + 1
    }

    pub fn is_root(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn is_fqdn(&self) -> bool {
        self.fqdn
    }

    pub fn num_labels(&self) -> usize {
        self.labels.len()
    }

    pub fn labels(&self) -> &[Vec<u8>] {
        &self.labels
    }

    /// Mark this name as fully qualified, treating it as relative to the root.
    pub fn to_fqdn(self) -> Self {
        Name {
            labels: self.labels,
            fqdn: true,
        }
    }

    /// Qualify this (relative) name with `other`, returning an error if the combined
    /// name would exceed the maximum length of a name.
    pub fn append(mut self, other: &Name) -> Result<Self, ResolveError> {
        if self.fqdn {
            return Ok(self);
        }

        let size = self.size() + other.size() - 1;
        if size > Self::MAX_LENGTH {
            return Err(ResolveError::invalid_name(format!(
                "Names are limited to {} bytes max: {}{}",
                Self::MAX_LENGTH,
                self,
                other
            )));
        }

        self.labels.extend(other.labels.iter().cloned());
        self.fqdn = other.fqdn;
        Ok(self)
    }

    /// True if `self` is equal to `other` or a subdomain of it.
    pub fn is_subdomain_of(&self, other: &Name) -> bool {
        self.labels.len() >= other.labels.len() && self.labels.ends_with(&other.labels)
    }

    pub fn write_network_bytes<T>(&self, mut buf: T) -> Result<(), ResolveError>
    where
        T: WriteBytesExt,
    {
        for label in self.labels.iter() {
            buf.write_u8(label.len() as u8)?;
            buf.write_all(label)?;
        }

        Ok(buf.write_u8(0)?)
    }

    pub fn read_network_bytes<T>(mut buf: T) -> Result<Self, ResolveError>
    where
        T: ReadBytesExt + Seek,
    {
        let mut labels = Vec::new();
        loop {
            let len = buf.read_u8()?;
            // A length with the top two bits set is a pointer to a name or label elsewhere
            // in the message. Follow it (and any pointers it leads to) then seek back to
            // just after the pointer since that's where the next field starts.
            if Self::is_offset(len) {
                let offset = Self::get_offset(len, buf.read_u8()?);
                let current = buf.stream_position()?;
                Self::read_offset_into(&mut buf, offset, &mut labels)?;
                buf.seek(SeekFrom::Start(current))?;
                break;
            }

            if Self::read_label_into(&mut buf, len, &mut labels)? {
                break;
            }
        }

        Ok(Name { labels, fqdn: true })
    }

    fn read_offset_into<T>(mut buf: T, offset: u64, out: &mut Vec<Vec<u8>>) -> Result<(), ResolveError>
    where
        T: ReadBytesExt + Seek,
    {
        buf.seek(SeekFrom::Start(offset))?;
        let mut pointers = 1;

        loop {
            // Only follow a fixed number of pointers so that a loop in a badly formed
            // message can't keep us here forever.
            if pointers > Self::MAX_POINTERS {
                return Err(ResolveError::malformed(format!(
                    "reached max number of pointers ({}) while reading name",
                    Self::MAX_POINTERS
                )));
            }

            let len = buf.read_u8()?;
            if Self::is_offset(len) {
                let offset = Self::get_offset(len, buf.read_u8()?);
                buf.seek(SeekFrom::Start(offset))?;
                pointers += 1;
                continue;
            }

            if Self::read_label_into(&mut buf, len, out)? {
                return Ok(());
            }
        }
    }

    /// Read the next name label of length `len` into `out` and return true if the
    /// label was the root label (`.`) and this name is complete, false otherwise.
    ///
    /// Labels from the wire may contain any byte. Only ASCII letters are folded to
    /// lower case, hostname character rules apply to user input alone.
    fn read_label_into<T>(buf: T, len: u8, out: &mut Vec<Vec<u8>>) -> Result<bool, ResolveError>
    where
        T: ReadBytesExt + Seek,
    {
        if len == 0 {
            return Ok(true);
        }

        // Only six bits are used for label lengths. Anything larger means one of the
        // reserved (non-pointer) bit patterns was used.
        if len as usize > Self::MAX_LABEL_LENGTH {
            return Err(ResolveError::malformed(format!(
                "max size for label would be exceeded reading {} bytes",
                len,
            )));
        }

        let current: usize = out.iter().map(|l| l.len() + 1).sum();
        if current + len as usize + 2 > Self::MAX_LENGTH {
            return Err(ResolveError::malformed(format!(
                "max size for name would be exceeded adding {} bytes to {}",
                len, current
            )));
        }

        let mut label = Vec::with_capacity(len as usize);
        let mut handle = buf.take(len as u64);
        let n = handle.read_to_end(&mut label)?;
        if n != len as usize {
            return Err(ResolveError::malformed(format!(
                "short read for Name segment. expected {} got {}",
                len, n
            )));
        }

        label.make_ascii_lowercase();
        out.push(label);
        Ok(false)
    }

    fn is_offset(len: u8) -> bool {
        len & 0b1100_0000 == 192
    }

    fn get_offset(len: u8, next: u8) -> u64 {
        let pointer = ((len & 0b0011_1111) as u16) << 8;
        (pointer | (next as u16)) as u64
    }
}

/// Write a label in presentation format: space, `.` and `\` are escaped with a
/// backslash and bytes outside printable ASCII as `\DDD`.
fn fmt_label(label: &[u8], f: &mut fmt::Formatter<'_>) -> fmt::Result {
    for &b in label {
        match b {
            b' ' | b'.' | b'\\' => write!(f, "\\{}", b as char)?,
            0x21..=0x7e => write!(f, "{}", b as char)?,
            _ => write!(f, "\\{:03}", b)?,
        }
    }

    Ok(())
}

impl Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.labels.is_empty() {
            return write!(f, ".");
        }

        for (i, label) in self.labels.iter().enumerate() {
            if i > 0 {
                write!(f, ".")?;
            }
            fmt_label(label, f)?;
        }

        if self.fqdn { write!(f, ".") } else { Ok(()) }
    }
}

impl FromStr for Name {
    type Err = ResolveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "." {
            return Ok(Self::root());
        }

        if s.is_empty() {
            return Err(ResolveError::invalid_name("Names must not be empty"));
        }

        let fqdn = s.ends_with('.');
        let trimmed = s.strip_suffix('.').unwrap_or(s);
        // One byte for each label length plus the root label.
        if trimmed.len() + 2 > Self::MAX_LENGTH {
            return Err(ResolveError::invalid_name(format!(
                "Names are limited to {} bytes max: {}",
                Self::MAX_LENGTH,
                s
            )));
        }

        let mut labels = Vec::new();
        for label in trimmed.split('.') {
            let len = label.len();
            if len == 0 {
                return Err(ResolveError::invalid_name(format!("Names must not contain empty labels: {}", s)));
            }

            if len > Self::MAX_LABEL_LENGTH {
                return Err(ResolveError::invalid_name(format!(
                    "Name labels are limited to {} bytes max: {}",
                    Self::MAX_LABEL_LENGTH,
                    label
                )));
            }

            for (i, c) in label.char_indices() {
                if i == 0 && !c.is_ascii_alphanumeric() && c != '_' {
                    return Err(ResolveError::invalid_name(format!(
                        "label must begin with ASCII letter, number, or underscore: {}",
                        label
                    )));
                } else if i == len - 1 && !c.is_ascii_alphanumeric() {
                    return Err(ResolveError::invalid_name(format!(
                        "label must end with ASCII letter or number: {}",
                        label
                    )));
                } else if !c.is_ascii_alphanumeric() && c != '-' && c != '_' {
                    return Err(ResolveError::invalid_name(format!(
                        "label must be ASCII letter, number, hyphen, or underscore: {}",
                        label
                    )));
                }
            }

            labels.push(label.to_ascii_lowercase().into_bytes());
        }

        Ok(Name { labels, fqdn })
    }
}
