// src/filesystem/metadata.rs
//! Ownership and permission values attached to package paths
//!
//! Owners and groups must be statically allocated accounts (base-passwd),
//! since the package is assembled without access to the target system's
//! user database. Modes accept octal (`0644`) or chmod-style symbolic
//! clauses (`u+rwX,og=rX`).

use serde::{Serialize, Serializer};
use std::fmt;

/// (name, id) pairs for statically allocated users
const STATIC_USERS: &[(&str, u32)] = &[
    ("root", 0),
    ("daemon", 1),
    ("bin", 2),
    ("sys", 3),
    ("sync", 4),
    ("games", 5),
    ("man", 6),
    ("lp", 7),
    ("mail", 8),
    ("news", 9),
    ("uucp", 10),
    ("proxy", 13),
    ("www-data", 33),
    ("backup", 34),
    ("list", 38),
    ("irc", 39),
    ("nobody", 65534),
];

/// (name, id) pairs for statically allocated groups
const STATIC_GROUPS: &[(&str, u32)] = &[
    ("root", 0),
    ("daemon", 1),
    ("bin", 2),
    ("sys", 3),
    ("adm", 4),
    ("tty", 5),
    ("disk", 6),
    ("lp", 7),
    ("mail", 8),
    ("news", 9),
    ("uucp", 10),
    ("man", 12),
    ("proxy", 13),
    ("kmem", 15),
    ("dialout", 20),
    ("fax", 21),
    ("voice", 22),
    ("cdrom", 24),
    ("floppy", 25),
    ("tape", 26),
    ("sudo", 27),
    ("audio", 29),
    ("dip", 30),
    ("www-data", 33),
    ("backup", 34),
    ("operator", 37),
    ("list", 38),
    ("irc", 39),
    ("src", 40),
    ("shadow", 42),
    ("utmp", 43),
    ("video", 44),
    ("sasl", 45),
    ("plugdev", 46),
    ("staff", 50),
    ("games", 60),
    ("users", 100),
    ("nogroup", 65534),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountKind {
    User,
    Group,
}

/// A statically known user or group
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Account {
    pub name: String,
    pub id: u32,
}

impl Account {
    pub fn root() -> Self {
        Self {
            name: "root".to_string(),
            id: 0,
        }
    }

    /// Parse `name`, a numeric id, or `name:id`
    pub fn parse(text: &str, kind: AccountKind) -> Result<Self, String> {
        let table = match kind {
            AccountKind::User => STATIC_USERS,
            AccountKind::Group => STATIC_GROUPS,
        };
        let label = match kind {
            AccountKind::User => "owner",
            AccountKind::Group => "group",
        };
        let text = text.trim();

        if let Some((name, id)) = text.split_once(':') {
            let id: u32 = id
                .parse()
                .map_err(|_| format!("invalid {label} id in \"{text}\""))?;
            return match table.iter().find(|(n, _)| *n == name) {
                Some((_, known)) if *known != id => Err(format!(
                    "{label} \"{name}\" has id {known}, not {id}"
                )),
                _ => Ok(Self {
                    name: name.to_string(),
                    id,
                }),
            };
        }

        if let Ok(id) = text.parse::<u32>() {
            return table
                .iter()
                .find(|(_, known)| *known == id)
                .map(|(name, id)| Self {
                    name: name.to_string(),
                    id: *id,
                })
                .ok_or_else(|| {
                    format!("{label} id {id} is not statically allocated; use \"name:{id}\"")
                });
        }

        table
            .iter()
            .find(|(name, _)| *name == text)
            .map(|(name, id)| Self {
                name: name.to_string(),
                id: *id,
            })
            .ok_or_else(|| {
                format!("{label} \"{text}\" is not statically allocated; use \"{text}:<id>\"")
            })
    }
}

impl fmt::Display for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name, self.id)
    }
}

impl Serialize for Account {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

const SETUID: u32 = 0o4000;
const SETGID: u32 = 0o2000;
const STICKY: u32 = 0o1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ModeOp {
    Add,
    Remove,
    Set,
}

/// One comma separated clause of a symbolic mode
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModeClause {
    who: Vec<char>,
    op: ModeOp,
    perms: Vec<char>,
}

/// Octal or symbolic file mode
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileMode {
    Octal(u32),
    Symbolic {
        text: String,
        clauses: Vec<ModeClause>,
    },
}

impl FileMode {
    pub fn parse(text: &str) -> Result<Self, String> {
        let text = text.trim();
        if text.is_empty() {
            return Err("empty mode".to_string());
        }
        if text.chars().all(|c| c.is_ascii_digit()) {
            let mode = u32::from_str_radix(text, 8)
                .map_err(|_| format!("invalid octal mode \"{text}\""))?;
            if mode > 0o7777 {
                return Err(format!("mode \"{text}\" is out of range"));
            }
            return Ok(Self::Octal(mode));
        }

        let mut clauses = Vec::new();
        for part in text.split(',') {
            let op_pos = part
                .find(['+', '-', '='])
                .ok_or_else(|| format!("missing operator in \"{part}\" of mode \"{text}\""))?;
            let (who, rest) = part.split_at(op_pos);
            let mut who: Vec<char> = who.chars().collect();
            if who.iter().any(|c| !matches!(c, 'u' | 'g' | 'o' | 'a')) {
                return Err(format!("invalid class in \"{part}\" of mode \"{text}\""));
            }
            if who.is_empty() || who.contains(&'a') {
                who = vec!['u', 'g', 'o'];
            }
            let mut chars = rest.chars();
            let op = match chars.next() {
                Some('+') => ModeOp::Add,
                Some('-') => ModeOp::Remove,
                _ => ModeOp::Set,
            };
            let perms: Vec<char> = chars.collect();
            if perms
                .iter()
                .any(|c| !matches!(c, 'r' | 'w' | 'x' | 'X' | 's' | 't'))
            {
                return Err(format!("invalid permission in \"{part}\" of mode \"{text}\""));
            }
            clauses.push(ModeClause { who, op, perms });
        }
        Ok(Self::Symbolic {
            text: text.to_string(),
            clauses,
        })
    }

    /// Apply to an existing mode
    pub fn compute(&self, current: u32, is_dir: bool) -> u32 {
        let clauses = match self {
            Self::Octal(mode) => return *mode,
            Self::Symbolic { clauses, .. } => clauses,
        };

        let mut mode = current & 0o7777;
        for clause in clauses {
            // X is judged against the mode before this clause
            let any_exec = is_dir || mode & 0o111 != 0;
            let mut bits = 0;
            let mut clear = 0;
            for class in &clause.who {
                let (shift, special) = match class {
                    'u' => (6, SETUID),
                    'g' => (3, SETGID),
                    _ => (0, STICKY),
                };
                clear |= (0o7 << shift) | if *class == 'o' { 0 } else { special };
                if *class == 'o' {
                    clear |= STICKY;
                }
                for perm in &clause.perms {
                    bits |= match perm {
                        'r' => 0o4 << shift,
                        'w' => 0o2 << shift,
                        'x' => 0o1 << shift,
                        'X' if any_exec => 0o1 << shift,
                        's' if *class != 'o' => special,
                        't' if *class == 'o' => STICKY,
                        _ => 0,
                    };
                }
            }
            mode = match clause.op {
                ModeOp::Add => mode | bits,
                ModeOp::Remove => mode & !bits,
                ModeOp::Set => (mode & !clear) | bits,
            };
        }
        mode
    }
}

impl fmt::Display for FileMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Octal(mode) => write!(f, "{mode:04o}"),
            Self::Symbolic { text, .. } => f.write_str(text),
        }
    }
}

/// Serialize a mode as a zero padded octal string
pub fn serialize_mode<S: Serializer>(mode: &u32, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(&format_args!("{mode:04o}"))
}
