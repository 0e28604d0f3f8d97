use serde::{Deserialize, Serialize};
use std::fmt;

/// A type argument of a parameterized [`BeanType`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TypeArg {
    Type(BeanType),
    /// Matches any argument when it appears in a required type.
    Wildcard,
}

/// A type a bean can be injected as.
///
/// Bean types are plain data so that metadata coming from discovery and types
/// derived from Rust generics compare the same way. `BeanType::of::<T>()` parses
/// `std::any::type_name`, so `Vec<String>` becomes `alloc::vec::Vec` with one
/// argument `alloc::string::String`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BeanType {
    name: String,
    args: Vec<TypeArg>,
}

impl BeanType {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: Vec::new(),
        }
    }

    pub fn of<T: ?Sized + 'static>() -> Self {
        Self::parse(std::any::type_name::<T>())
    }

    /// Parse a rendered type such as `my::Repo<my::User, ?>`.
    ///
    /// `?` and `_` arguments become [`TypeArg::Wildcard`]. Anything that is not a
    /// simple `Name<Args>` shape (trait objects with extra bounds, tuples, fn
    /// pointers) is kept verbatim as the type name.
    pub fn parse(rendered: &str) -> Self {
        let rendered = rendered.trim();
        let (Some(open), true) = (rendered.find('<'), rendered.ends_with('>')) else {
            return Self::named(rendered);
        };
        let inner = &rendered[open + 1..rendered.len() - 1];
        let Some(parts) = split_top_level(inner) else {
            return Self::named(rendered);
        };
        let args = parts
            .into_iter()
            .map(|part| match part {
                "?" | "_" => TypeArg::Wildcard,
                other => TypeArg::Type(Self::parse(other)),
            })
            .collect();
        Self {
            name: rendered[..open].trim().to_string(),
            args,
        }
    }

    pub fn with_arg(mut self, arg: BeanType) -> Self {
        self.args.push(TypeArg::Type(arg));
        self
    }

    pub fn with_wildcard(mut self) -> Self {
        self.args.push(TypeArg::Wildcard);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Last path segment of the name, `Repo` for `my::repo::Repo`.
    pub fn simple_name(&self) -> &str {
        self.name.rsplit("::").next().unwrap_or(&self.name)
    }

    pub fn args(&self) -> &[TypeArg] {
        &self.args
    }

    pub fn is_parameterized(&self) -> bool {
        !self.args.is_empty()
    }

    /// Whether a bean exposing `candidate` satisfies a request for `self`.
    ///
    /// Names must be identical and type arguments match invariantly; a wildcard
    /// in the required type accepts any argument. A raw required type does not
    /// match a parameterized bean type.
    pub fn is_assignable_from(&self, candidate: &BeanType) -> bool {
        self.name == candidate.name
            && self.args.len() == candidate.args.len()
            && self
                .args
                .iter()
                .zip(&candidate.args)
                .all(|(required, actual)| match (required, actual) {
                    (TypeArg::Wildcard, _) => true,
                    (TypeArg::Type(required), TypeArg::Type(actual)) => {
                        required.is_assignable_from(actual)
                    }
                    (TypeArg::Type(_), TypeArg::Wildcard) => false,
                })
    }
}

impl fmt::Display for BeanType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        if self.args.is_empty() {
            return Ok(());
        }
        f.write_str("<")?;
        for (index, arg) in self.args.iter().enumerate() {
            if index > 0 {
                f.write_str(", ")?;
            }
            match arg {
                TypeArg::Type(ty) => write!(f, "{ty}")?,
                TypeArg::Wildcard => f.write_str("?")?,
            }
        }
        f.write_str(">")
    }
}

impl From<&str> for BeanType {
    fn from(rendered: &str) -> Self {
        Self::parse(rendered)
    }
}

fn split_top_level(inner: &str) -> Option<Vec<&str>> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (index, ch) in inner.char_indices() {
        match ch {
            '<' | '(' | '[' => depth += 1,
            '>' | ')' | ']' => depth = depth.checked_sub(1)?,
            ',' if depth == 0 => {
                parts.push(inner[start..index].trim());
                start = index + 1;
            }
            _ => {}
        }
    }
    if depth != 0 {
        return None;
    }
    parts.push(inner[start..].trim());
    Some(parts)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Repo<T>(T);
    struct User;

    #[test]
    fn test_of_parses_generic_arguments() {
        let ty = BeanType::of::<Repo<User>>();
        assert!(ty.name().ends_with("Repo"));
        assert_eq!(ty.simple_name(), "Repo");
        assert_eq!(ty.args().len(), 1);
        assert_eq!(ty.args()[0], TypeArg::Type(BeanType::of::<User>()));
    }

    #[test]
    fn test_nested_arguments_and_display() {
        let ty = BeanType::parse("Map<String, Vec<u8>>");
        assert_eq!(ty.to_string(), "Map<String, Vec<u8>>");
        assert_eq!(
            ty,
            BeanType::named("Map")
                .with_arg(BeanType::named("String"))
                .with_arg(BeanType::named("Vec").with_arg(BeanType::named("u8")))
        );
    }

    #[test]
    fn test_type_arguments_are_invariant() {
        let required = BeanType::parse("List<Number>");
        assert!(required.is_assignable_from(&BeanType::parse("List<Number>")));
        assert!(!required.is_assignable_from(&BeanType::parse("List<Integer>")));
    }

    #[test]
    fn test_wildcard_accepts_any_argument() {
        let required = BeanType::parse("List<?>");
        assert!(required.is_assignable_from(&BeanType::parse("List<Integer>")));
        assert!(required.is_assignable_from(&BeanType::parse("List<String>")));
        assert!(!required.is_assignable_from(&BeanType::parse("Set<String>")));
        // wildcard on the bean side never satisfies a concrete requirement
        assert!(!BeanType::parse("List<String>").is_assignable_from(&required));
    }

    #[test]
    fn test_raw_type_does_not_match_parameterized() {
        assert!(!BeanType::named("List").is_assignable_from(&BeanType::parse("List<String>")));
    }

    #[test]
    fn test_unbalanced_rendering_is_kept_verbatim() {
        let ty = BeanType::parse("dyn Foo<A> + Send");
        assert_eq!(ty.name(), "dyn Foo<A> + Send");
        assert!(!ty.is_parameterized());
    }
}
