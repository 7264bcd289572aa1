//! Permission modes: literal octal bits or chmod-style symbolic expressions

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, de};
use symclone_fs::PERMISSION_BITS;

use crate::Error;

/// The `u`, `g` and `o` classes a symbolic clause applies to.
const USER: u8 = 0b100;
const GROUP: u8 = 0b010;
const OTHER: u8 = 0b001;
const ALL: u8 = USER | GROUP | OTHER;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Add,
    Remove,
    Set,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Perms {
    read: bool,
    write: bool,
    execute: bool,
    /// `X`: execute only for directories or entries already executable by someone
    conditional_execute: bool,
    special: bool,
    sticky: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Action {
    op: Op,
    perms: Perms,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Clause {
    who: u8,
    actions: Vec<Action>,
}

/// A desired permission mode.
///
/// Literal bits replace the current mode outright; symbolic expressions
/// (`u=rwX,g+r,o-w`) are evaluated against each entry's current mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModeSpec {
    Bits(u32),
    Symbolic(SymbolicMode),
}

/// A parsed symbolic mode expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolicMode {
    source: String,
    clauses: Vec<Clause>,
}

impl ModeSpec {
    /// Literal permission bits; anything above `0o7777` is rejected.
    pub fn from_bits(bits: u32) -> Result<Self, Error> {
        if bits & !PERMISSION_BITS != 0 {
            return Err(Error::InvalidMode {
                value: format!("{:o}", bits),
                reason: "permission bits exceed 07777".into(),
            });
        }
        Ok(Self::Bits(bits))
    }

    /// Mode an entry should end up with given its current permission bits.
    pub fn resolve(&self, current: u32, is_dir: bool) -> u32 {
        match self {
            Self::Bits(bits) => *bits,
            Self::Symbolic(symbolic) => symbolic.apply(current & PERMISSION_BITS, is_dir),
        }
    }
}

impl SymbolicMode {
    fn apply(&self, current: u32, is_dir: bool) -> u32 {
        let mut mode = current;
        for clause in &self.clauses {
            for action in &clause.actions {
                // `X` looks at the mode as it stands before this action
                let bits = bits_for(clause.who, action.perms, mode, is_dir);
                mode = match action.op {
                    Op::Add => mode | bits,
                    Op::Remove => mode & !bits,
                    Op::Set => (mode & !class_mask(clause.who)) | bits,
                };
            }
        }
        mode
    }
}

fn class_mask(who: u8) -> u32 {
    let mut mask = 0;
    if who & USER != 0 {
        mask |= 0o4700;
    }
    if who & GROUP != 0 {
        mask |= 0o2070;
    }
    if who & OTHER != 0 {
        mask |= 0o1007;
    }
    mask
}

fn bits_for(who: u8, perms: Perms, current: u32, is_dir: bool) -> u32 {
    let execute =
        perms.execute || (perms.conditional_execute && (is_dir || current & 0o111 != 0));

    let mut bits = 0;
    for (class, shift) in [(USER, 6), (GROUP, 3), (OTHER, 0)] {
        if who & class == 0 {
            continue;
        }
        let mut rwx = 0;
        if perms.read {
            rwx |= 0o4;
        }
        if perms.write {
            rwx |= 0o2;
        }
        if execute {
            rwx |= 0o1;
        }
        bits |= rwx << shift;
    }
    if perms.special && who & USER != 0 {
        bits |= 0o4000;
    }
    if perms.special && who & GROUP != 0 {
        bits |= 0o2000;
    }
    if perms.sticky && who & OTHER != 0 {
        bits |= 0o1000;
    }
    bits
}

fn parse_symbolic(value: &str) -> Result<SymbolicMode, String> {
    let mut clauses = Vec::new();
    for raw in value.split(',') {
        let mut chars = raw.chars().peekable();

        let mut who = 0;
        while let Some(&c) = chars.peek() {
            who |= match c {
                'u' => USER,
                'g' => GROUP,
                'o' => OTHER,
                'a' => ALL,
                _ => break,
            };
            chars.next();
        }
        if who == 0 {
            who = ALL;
        }

        let mut actions = Vec::new();
        while let Some(c) = chars.next() {
            let op = match c {
                '+' => Op::Add,
                '-' => Op::Remove,
                '=' => Op::Set,
                other => return Err(format!("unexpected {:?} in clause {:?}", other, raw)),
            };
            let mut perms = Perms::default();
            while let Some(&c) = chars.peek() {
                match c {
                    'r' => perms.read = true,
                    'w' => perms.write = true,
                    'x' => perms.execute = true,
                    'X' => perms.conditional_execute = true,
                    's' => perms.special = true,
                    't' => perms.sticky = true,
                    '+' | '-' | '=' => break,
                    other => {
                        return Err(format!("unknown permission {:?} in clause {:?}", other, raw));
                    }
                }
                chars.next();
            }
            actions.push(Action { op, perms });
        }
        if actions.is_empty() {
            return Err(format!("clause {:?} has no operator", raw));
        }
        clauses.push(Clause { who, actions });
    }

    Ok(SymbolicMode {
        source: value.to_string(),
        clauses,
    })
}

impl FromStr for ModeSpec {
    type Err = Error;

    /// Octal digits (with an optional `0o` prefix) are literal bits, anything
    /// else must be a symbolic expression.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = s.trim();
        let digits = value.strip_prefix("0o").unwrap_or(value);
        if !digits.is_empty() && digits.bytes().all(|b| (b'0'..=b'7').contains(&b)) {
            let bits = u32::from_str_radix(digits, 8).map_err(|e| Error::InvalidMode {
                value: s.to_string(),
                reason: e.to_string(),
            })?;
            return Self::from_bits(bits).map_err(|_| Error::InvalidMode {
                value: s.to_string(),
                reason: "permission bits exceed 07777".into(),
            });
        }

        parse_symbolic(value)
            .map(Self::Symbolic)
            .map_err(|reason| Error::InvalidMode {
                value: s.to_string(),
                reason,
            })
    }
}

impl fmt::Display for ModeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bits(bits) => write!(f, "0{:03o}", bits),
            Self::Symbolic(symbolic) => write!(f, "{}", symbolic.source),
        }
    }
}

impl<'de> Deserialize<'de> for ModeSpec {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Bits(u32),
            Text(String),
        }

        match Repr::deserialize(deserializer)? {
            Repr::Bits(bits) => ModeSpec::from_bits(bits).map_err(de::Error::custom),
            Repr::Text(text) => text.parse().map_err(de::Error::custom),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn mode(s: &str) -> ModeSpec {
        s.parse().unwrap()
    }

    #[rstest]
    #[case("0755", 0o755)]
    #[case("755", 0o755)]
    #[case("0o640", 0o640)]
    #[case("04755", 0o4755)]
    #[case("0", 0)]
    fn octal_strings_are_literal_bits(#[case] input: &str, #[case] expected: u32) {
        assert_eq!(mode(input), ModeSpec::Bits(expected));
    }

    #[test]
    fn literal_bits_ignore_current_mode() {
        assert_eq!(mode("0640").resolve(0o777, true), 0o640);
    }

    #[rstest]
    #[case("u=rwx,g=rx,o=", 0o000, false, 0o750)]
    #[case("g+w", 0o644, false, 0o664)]
    #[case("o-r", 0o644, false, 0o640)]
    #[case("a+X", 0o644, true, 0o755)]
    #[case("a+X", 0o644, false, 0o644)]
    #[case("a+X", 0o744, false, 0o755)]
    #[case("+x", 0o600, false, 0o711)]
    #[case("u+s,g+s", 0o755, true, 0o6755)]
    #[case("+t", 0o777, true, 0o1777)]
    #[case("u=rw-w+x", 0o000, false, 0o500)]
    #[case("go=", 0o4777, false, 0o4700)]
    fn symbolic_modes_apply_to_current(
        #[case] input: &str,
        #[case] current: u32,
        #[case] is_dir: bool,
        #[case] expected: u32,
    ) {
        assert_eq!(mode(input).resolve(current, is_dir), expected);
    }

    #[rstest]
    #[case("u=rwq")]
    #[case("z+r")]
    #[case("ug")]
    #[case("")]
    #[case("07777777")]
    fn malformed_modes_are_rejected(#[case] input: &str) {
        let err = input.parse::<ModeSpec>().unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn deserializes_from_int_or_string() {
        let from_int: ModeSpec = serde_json::from_str("493").unwrap();
        let from_text: ModeSpec = serde_json::from_str("\"u=rwx,go=rx\"").unwrap();

        assert_eq!(from_int, ModeSpec::Bits(0o755));
        assert_eq!(from_text.resolve(0, true), 0o755);
    }

    #[test]
    fn display_round_trips_the_input() {
        assert_eq!(mode("755").to_string(), "0755");
        assert_eq!(mode("u+x").to_string(), "u+x");
    }
}
