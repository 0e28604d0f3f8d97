use crate::bean::NonBindingMembers;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

/// An annotation-like marker that attaches interceptors to a bean or method.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InterceptorBinding {
    name: String,
    members: BTreeMap<String, String>,
}

impl InterceptorBinding {
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

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn members(&self) -> &BTreeMap<String, String> {
        &self.members
    }
}

impl fmt::Display for InterceptorBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.name)?;
        if !self.members.is_empty() {
            let members: Vec<String> = self
                .members
                .iter()
                .map(|(member, value)| format!("{member}={value}"))
                .collect();
            write!(f, "({})", members.join(", "))?;
        }
        Ok(())
    }
}

/// Declared interceptor binding types.
///
/// Besides non-binding members, a binding may imply other bindings (a stereotype
/// style `@Resilient` implying `@Retry` and `@Timeout`), and bindings can be put
/// into exclusive groups whose members must never apply to the same target.
#[derive(Debug, Clone, Default)]
pub struct BindingRegistry {
    non_binding: NonBindingMembers,
    implied: HashMap<String, Vec<InterceptorBinding>>,
    exclusive: Vec<Vec<String>>,
}

impl BindingRegistry {
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

    pub fn is_declared(&self, name: &str) -> bool {
        self.non_binding.is_declared(name)
    }

    pub fn implies(&mut self, name: impl Into<String>, implied: InterceptorBinding) {
        self.implied.entry(name.into()).or_default().push(implied);
    }

    /// At most one binding out of `names` may apply to a target.
    pub fn exclusive<I, S>(&mut self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclusive.push(names.into_iter().map(Into::into).collect());
    }

    pub fn matches(&self, required: &InterceptorBinding, present: &InterceptorBinding) -> bool {
        self.non_binding
            .equal(&required.name, &required.members, &present.name, &present.members)
    }

    /// The bindings plus everything they imply, transitively, without duplicates.
    pub fn expand(&self, bindings: &[InterceptorBinding]) -> Vec<InterceptorBinding> {
        let mut expanded: Vec<InterceptorBinding> = Vec::new();
        let mut pending: Vec<InterceptorBinding> = bindings.to_vec();
        pending.reverse();
        while let Some(binding) = pending.pop() {
            if expanded.contains(&binding) {
                continue;
            }
            if let Some(implied) = self.implied.get(&binding.name) {
                pending.extend(implied.iter().rev().cloned());
            }
            expanded.push(binding);
        }
        expanded
    }

    /// Method-level bindings replace class-level bindings of the same name.
    pub fn merge(
        &self,
        class: &[InterceptorBinding],
        method: &[InterceptorBinding],
    ) -> Vec<InterceptorBinding> {
        let method = self.expand(method);
        let mut merged: Vec<InterceptorBinding> = self
            .expand(class)
            .into_iter()
            .filter(|binding| !method.iter().any(|m| m.name == binding.name))
            .collect();
        merged.extend(method);
        merged
    }

    /// Descriptions of every conflict among `bindings`.
    pub fn conflicts(&self, bindings: &[InterceptorBinding]) -> Vec<String> {
        let mut conflicts = Vec::new();
        for (index, binding) in bindings.iter().enumerate() {
            for other in &bindings[index + 1..] {
                if binding.name == other.name && !self.matches(binding, other) {
                    conflicts.push(format!("{binding} conflicts with {other}"));
                }
            }
        }
        for group in &self.exclusive {
            let present: Vec<&InterceptorBinding> = bindings
                .iter()
                .filter(|binding| group.contains(&binding.name))
                .collect();
            let names: BTreeSet<&str> = present.iter().map(|binding| binding.name()).collect();
            if names.len() > 1 {
                let rendered: Vec<String> = present.iter().map(ToString::to_string).collect();
                conflicts.push(format!(
                    "{} are mutually exclusive",
                    rendered.join(" and ")
                ));
            }
        }
        conflicts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_follows_implied_bindings_transitively() {
        let mut registry = BindingRegistry::new();
        registry.implies("Resilient", InterceptorBinding::new("Retry"));
        registry.implies("Retry", InterceptorBinding::new("Logged"));
        let expanded = registry.expand(&[InterceptorBinding::new("Resilient")]);
        let names: Vec<&str> = expanded.iter().map(InterceptorBinding::name).collect();
        assert_eq!(names, ["Resilient", "Retry", "Logged"]);
    }

    #[test]
    fn test_method_binding_overrides_class_binding() {
        let registry = BindingRegistry::new();
        let merged = registry.merge(
            &[InterceptorBinding::new("Retry").with_member("attempts", "3")],
            &[InterceptorBinding::new("Retry").with_member("attempts", "5")],
        );
        assert_eq!(merged, [InterceptorBinding::new("Retry").with_member("attempts", "5")]);
    }

    #[test]
    fn test_exclusive_bindings_conflict() {
        let mut registry = BindingRegistry::new();
        registry.exclusive(["FixedBackoff", "ExponentialBackoff"]);
        let conflicts = registry.conflicts(&[
            InterceptorBinding::new("FixedBackoff"),
            InterceptorBinding::new("Logged"),
            InterceptorBinding::new("ExponentialBackoff"),
        ]);
        assert_eq!(conflicts.len(), 1);
        assert!(conflicts[0].contains("mutually exclusive"));
    }

    #[test]
    fn test_same_binding_with_different_members_conflicts() {
        let mut registry = BindingRegistry::new();
        registry.declare("Retry", ["comment"]);
        let same = registry.conflicts(&[
            InterceptorBinding::new("Retry").with_member("comment", "a"),
            InterceptorBinding::new("Retry").with_member("comment", "b"),
        ]);
        assert!(same.is_empty());
        let different = registry.conflicts(&[
            InterceptorBinding::new("Retry").with_member("attempts", "3"),
            InterceptorBinding::new("Retry").with_member("attempts", "5"),
        ]);
        assert_eq!(different.len(), 1);
    }
}
