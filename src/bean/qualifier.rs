use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

pub const DEFAULT: &str = "Default";
pub const ANY: &str = "Any";
pub const NAMED: &str = "Named";

/// A typed discriminator between beans of the same type.
///
/// A qualifier is an annotation-like key plus a map of member values. Members
/// registered as non-binding through [`QualifierRegistry::declare`] are ignored
/// when qualifiers are compared.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Qualifier {
    name: String,
    members: BTreeMap<String, String>,
}

impl Qualifier {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            members: BTreeMap::new(),
        }
    }

    pub fn with_member(mut self, member: impl Into<String>, value: impl Into<String>) -> Self {
        self.members.insert(member.into(), value.into());
        self
    }

    pub fn default_qualifier() -> Self {
        Self::new(DEFAULT)
    }

    pub fn any() -> Self {
        Self::new(ANY)
    }

    pub fn named(value: impl Into<String>) -> Self {
        Self::new(NAMED).with_member("value", value)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn members(&self) -> &BTreeMap<String, String> {
        &self.members
    }

    pub fn is_default(&self) -> bool {
        self.name == DEFAULT
    }

    pub fn is_any(&self) -> bool {
        self.name == ANY
    }

    pub fn is_named(&self) -> bool {
        self.name == NAMED
    }
}

impl fmt::Display for Qualifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.name)?;
        if self.members.is_empty() {
            return Ok(());
        }
        let members: Vec<String> = self
            .members
            .iter()
            .map(|(member, value)| format!("{member}={value}"))
            .collect();
        write!(f, "({})", members.join(", "))
    }
}

/// Non-binding member declarations, keyed by annotation name.
///
/// Shared by qualifiers and interceptor bindings, which compare the same way.
#[derive(Debug, Clone, Default)]
pub struct NonBindingMembers {
    members: HashMap<String, BTreeSet<String>>,
}

impl NonBindingMembers {
    pub fn declare<I, S>(&mut self, name: impl Into<String>, non_binding: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.members
            .entry(name.into())
            .or_default()
            .extend(non_binding.into_iter().map(Into::into));
    }

    pub fn is_declared(&self, name: &str) -> bool {
        self.members.contains_key(name)
    }

    /// Compare two annotation literals of the same name, ignoring non-binding members.
    pub fn equal(
        &self,
        name_a: &str,
        members_a: &BTreeMap<String, String>,
        name_b: &str,
        members_b: &BTreeMap<String, String>,
    ) -> bool {
        if name_a != name_b {
            return false;
        }
        let ignored = self.members.get(name_a);
        let binding = |members: &BTreeMap<String, String>| -> Vec<(String, String)> {
            members
                .iter()
                .filter(|(member, _)| ignored.is_none_or(|set| !set.contains(*member)))
                .map(|(member, value)| (member.clone(), value.clone()))
                .collect()
        };
        binding(members_a) == binding(members_b)
    }
}

/// Qualifier declarations known to a deployment.
#[derive(Debug, Clone, Default)]
pub struct QualifierRegistry {
    non_binding: NonBindingMembers,
}

impl QualifierRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn declare<I, S>(&mut self, name: impl Into<String>, non_binding: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.non_binding.declare(name, non_binding);
    }

    pub fn matches(&self, required: &Qualifier, candidate: &Qualifier) -> bool {
        self.non_binding.equal(
            &required.name,
            &required.members,
            &candidate.name,
            &candidate.members,
        )
    }

    /// Every required qualifier must be present on the bean.
    ///
    /// `required` is expected to be normalized with [`normalize_required`], so an
    /// empty requirement has already become `@Default`.
    pub fn has_all(&self, required: &[Qualifier], bean: &[Qualifier]) -> bool {
        required
            .iter()
            .all(|required| bean.iter().any(|candidate| self.matches(required, candidate)))
    }
}

/// Bean-side qualifier rules: `@Any` is always present, and `@Default` is added
/// unless a qualifier other than `@Named`/`@Any` is declared.
pub fn normalize_bean_qualifiers(mut declared: Vec<Qualifier>) -> Vec<Qualifier> {
    let explicit = declared
        .iter()
        .any(|q| !q.is_named() && !q.is_any() && !q.is_default());
    if !explicit && !declared.iter().any(Qualifier::is_default) {
        declared.push(Qualifier::default_qualifier());
    }
    if !declared.iter().any(Qualifier::is_any) {
        declared.push(Qualifier::any());
    }
    dedup(declared)
}

/// Injection-side rules: no explicit qualifier means `@Default`.
pub fn normalize_required(required: &[Qualifier]) -> Vec<Qualifier> {
    if required.is_empty() {
        vec![Qualifier::default_qualifier()]
    } else {
        dedup(required.to_vec())
    }
}

pub fn render(qualifiers: &[Qualifier]) -> String {
    let rendered: Vec<String> = qualifiers.iter().map(ToString::to_string).collect();
    format!("[{}]", rendered.join(", "))
}

fn dedup(qualifiers: Vec<Qualifier>) -> Vec<Qualifier> {
    let mut unique = Vec::with_capacity(qualifiers.len());
    for qualifier in qualifiers {
        if !unique.contains(&qualifier) {
            unique.push(qualifier);
        }
    }
    unique
}
