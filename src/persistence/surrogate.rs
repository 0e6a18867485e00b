// The surrogate codec: each entity maps onto a flat struct of numbers and
// percent-encoded strings, rendered as one `{ key: value , ... }` line.
//
// Free text is percent-encoded byte-wise over its UTF-8 form, so the
// structural characters (braces, commas, colons, newlines) can never appear
// raw inside a value and a line splits cleanly on fixed delimiters. Key
// order is fixed per entity type, which makes serialization deterministic.
//
// Surrogates hold raw field values only. Resolving ids back into real
// entities (and deciding what a dangling id means) is the reader's job.

use crate::core::employee::{Employee, EmployeeId, EmployeeName};
use crate::core::project::{Project, ProjectId, ProjectName};
use crate::core::time_entry::{TimeEntry, epoch_day};
use crate::core::user::{User, UserId, UserName};
use crate::core::validation::ValidationError;
use crate::persistence::errors::DeserializationError;

const NULL_TOKEN: &str = "null";

fn encode(value: &str) -> String {
    const HEX: &[u8; 16] = b"0123456789ABCDEF";
    let mut out = String::with_capacity(value.len());
    for byte in value.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                out.push(byte as char);
            }
            _ => {
                out.push('%');
                out.push(HEX[usize::from(byte >> 4)] as char);
                out.push(HEX[usize::from(byte & 0x0F)] as char);
            }
        }
    }
    out
}

fn decode(value: &str) -> Option<String> {
    let raw = value.as_bytes();
    let mut bytes = Vec::with_capacity(raw.len());
    let mut i = 0;
    while i < raw.len() {
        if raw[i] == b'%' {
            let hi = hex_value(*raw.get(i + 1)?)?;
            let lo = hex_value(*raw.get(i + 2)?)?;
            bytes.push(hi << 4 | lo);
            i += 3;
        } else {
            bytes.push(raw[i]);
            i += 1;
        }
    }
    String::from_utf8(bytes).ok()
}

fn hex_value(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        _ => None,
    }
}

/// The `key: value` pairs of one serialized line, still undecoded.
struct FieldMap<'a> {
    entity: &'static str,
    raw: &'a str,
    pairs: Vec<(&'a str, &'a str)>,
}

impl<'a> FieldMap<'a> {
    fn parse(entity: &'static str, raw: &'a str) -> Result<Self, DeserializationError> {
        let pairs = split_pairs(raw).ok_or_else(|| DeserializationError::new(entity, raw))?;
        Ok(Self { entity, raw, pairs })
    }

    fn malformed(&self) -> DeserializationError {
        DeserializationError::new(self.entity, self.raw)
    }

    fn value(&self, key: &str) -> Result<&'a str, DeserializationError> {
        self.pairs
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| *v)
            .ok_or_else(|| self.malformed())
    }

    fn text(&self, key: &str) -> Result<String, DeserializationError> {
        decode(self.value(key)?).ok_or_else(|| self.malformed())
    }

    fn number<T: std::str::FromStr>(&self, key: &str) -> Result<T, DeserializationError> {
        self.value(key)?.parse().map_err(|_| self.malformed())
    }

    fn optional_number(&self, key: &str) -> Result<Option<u32>, DeserializationError> {
        let value = self.value(key)?;
        if value == NULL_TOKEN {
            return Ok(None);
        }
        value.parse().map(Some).map_err(|_| self.malformed())
    }
}

fn split_pairs(text: &str) -> Option<Vec<(&str, &str)>> {
    let inner = text.strip_prefix("{ ")?.strip_suffix(" }")?;
    inner
        .split(" , ")
        .map(|pair| pair.split_once(": "))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmployeeSurrogate {
    pub id: u32,
    pub name: String,
}

impl EmployeeSurrogate {
    pub const ENTITY: &'static str = "employee";

    pub fn from_employee(employee: &Employee) -> Self {
        Self {
            id: employee.id.value(),
            name: employee.name.as_str().to_string(),
        }
    }

    pub fn to_employee(&self) -> Result<Employee, ValidationError> {
        Ok(Employee {
            id: EmployeeId::new(self.id)?,
            name: EmployeeName::new(self.name.clone())?,
        })
    }

    pub fn serialize(&self) -> String {
        format!("{{ id: {} , name: {} }}", self.id, encode(&self.name))
    }

    pub fn deserialize(text: &str) -> Result<Self, DeserializationError> {
        let map = FieldMap::parse(Self::ENTITY, text)?;
        Ok(Self {
            id: map.number("id")?,
            name: map.text("name")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectSurrogate {
    pub id: u32,
    pub name: String,
}

impl ProjectSurrogate {
    pub const ENTITY: &'static str = "project";

    pub fn from_project(project: &Project) -> Self {
        Self {
            id: project.id.value(),
            name: project.name.as_str().to_string(),
        }
    }

    pub fn to_project(&self) -> Result<Project, ValidationError> {
        Ok(Project {
            id: ProjectId::new(self.id)?,
            name: ProjectName::new(self.name.clone())?,
        })
    }

    pub fn serialize(&self) -> String {
        format!("{{ id: {} , name: {} }}", self.id, encode(&self.name))
    }

    pub fn deserialize(text: &str) -> Result<Self, DeserializationError> {
        let map = FieldMap::parse(Self::ENTITY, text)?;
        Ok(Self {
            id: map.number("id")?,
            name: map.text("name")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserSurrogate {
    pub id: u32,
    pub name: String,
    pub hash: String,
    pub salt: String,
    pub employee_id: Option<u32>,
}

impl UserSurrogate {
    pub const ENTITY: &'static str = "user";

    pub fn from_user(user: &User) -> Self {
        Self {
            id: user.id.value(),
            name: user.name.as_str().to_string(),
            hash: user.hash.clone(),
            salt: user.salt.clone(),
            employee_id: user.employee_id.map(EmployeeId::value),
        }
    }

    pub fn to_user(&self) -> Result<User, ValidationError> {
        let employee_id = match self.employee_id {
            Some(id) => Some(EmployeeId::new(id)?),
            None => None,
        };
        Ok(User {
            id: UserId::new(self.id)?,
            name: UserName::new(self.name.clone())?,
            hash: self.hash.clone(),
            salt: self.salt.clone(),
            employee_id,
        })
    }

    pub fn serialize(&self) -> String {
        let employee_id = match self.employee_id {
            Some(id) => id.to_string(),
            None => NULL_TOKEN.to_string(),
        };
        format!(
            "{{ id: {} , name: {} , hash: {} , salt: {} , empId: {} }}",
            self.id,
            encode(&self.name),
            encode(&self.hash),
            encode(&self.salt),
            employee_id
        )
    }

    pub fn deserialize(text: &str) -> Result<Self, DeserializationError> {
        let map = FieldMap::parse(Self::ENTITY, text)?;
        Ok(Self {
            id: map.number("id")?,
            name: map.text("name")?,
            hash: map.text("hash")?,
            salt: map.text("salt")?,
            employee_id: map.optional_number("empId")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSurrogate {
    pub token: String,
    pub user_id: u32,
    pub created_epoch_millis: i64,
}

impl SessionSurrogate {
    pub const ENTITY: &'static str = "session";

    pub fn serialize(&self) -> String {
        format!(
            "{{ s: {} , id: {} , e: {} }}",
            encode(&self.token),
            self.user_id,
            self.created_epoch_millis
        )
    }

    pub fn deserialize(text: &str) -> Result<Self, DeserializationError> {
        let map = FieldMap::parse(Self::ENTITY, text)?;
        Ok(Self {
            token: map.text("s")?,
            user_id: map.number("id")?,
            created_epoch_millis: map.number("e")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeEntrySurrogate {
    pub id: u32,
    pub employee_id: u32,
    pub project_id: u32,
    pub minutes: u32,
    pub epoch_day: i64,
    pub details: String,
}

impl TimeEntrySurrogate {
    pub const ENTITY: &'static str = "time entry";

    pub fn from_time_entry(entry: &TimeEntry) -> Self {
        Self {
            id: entry.id.value(),
            employee_id: entry.employee.id.value(),
            project_id: entry.project.id.value(),
            minutes: entry.minutes.value(),
            epoch_day: epoch_day(entry.date),
            details: entry.details.as_str().to_string(),
        }
    }

    pub fn serialize(&self) -> String {
        format!(
            "{{ i: {} , e: {} , p: {} , t: {} , d: {} , dtl: {} }}",
            self.id,
            self.employee_id,
            self.project_id,
            self.minutes,
            self.epoch_day,
            encode(&self.details)
        )
    }

    pub fn deserialize(text: &str) -> Result<Self, DeserializationError> {
        let map = FieldMap::parse(Self::ENTITY, text)?;
        Ok(Self {
            id: map.number("i")?,
            employee_id: map.number("e")?,
            project_id: map.number("p")?,
            minutes: map.number("t")?,
            epoch_day: map.number("d")?,
            details: map.text("dtl")?,
        })
    }
}
