use std::{
    borrow::Cow,
    fmt::{Debug, Display},
    hash::{Hash, Hasher},
    marker::PhantomData,
    sync::atomic::{AtomicU64, Ordering},
};

use crate::types::{Injectable, TypeInfo};

static NEXT_UNIQUE_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a binding
///
/// Two keys are equal only if they name the same thing, the shape of the produced
/// value never takes part in the comparison.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TokenKey {
    /// A plain name, equal to every other key with the same name
    Named(Cow<'static, str>),
    /// A process unique marker, only equal to itself and its clones
    Unique { id: u64, description: &'static str },
    /// The identity of a type
    Type(TypeInfo),
}

impl Display for TokenKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenKey::Named(name) => f.write_str(name),
            TokenKey::Unique { id, description } => write!(f, "{description}#{id}"),
            TokenKey::Type(info) => f.write_str(info.type_name),
        }
    }
}

impl AsRef<TokenKey> for TokenKey {
    fn as_ref(&self) -> &TokenKey {
        self
    }
}

/// Names a binding producing values of type `T`
///
/// ```rust
/// use wrapp_container::Token;
///
/// struct Database;
///
/// const DATABASE_URL: Token<String> = Token::constant("database_url");
/// let database = Token::<Database>::of_type();
/// let marker = Token::<Database>::unique("replica");
///
/// assert_ne!(marker.key(), database.key());
/// assert_eq!(DATABASE_URL.to_string(), "database_url");
/// ```
pub struct Token<T: ?Sized> {
    key: TokenKey,
    _marker: PhantomData<fn() -> Box<T>>,
}

impl<T: ?Sized> Token<T> {
    /// Token identified by name
    pub fn named(name: impl Into<Cow<'static, str>>) -> Self {
        Self::from_key(TokenKey::Named(name.into()))
    }

    /// Same as [Token::named], usable in const context
    pub const fn constant(name: &'static str) -> Self {
        Token {
            key: TokenKey::Named(Cow::Borrowed(name)),
            _marker: PhantomData,
        }
    }

    /// A token no other call can ever produce again
    pub fn unique(description: &'static str) -> Self {
        let id = NEXT_UNIQUE_ID.fetch_add(1, Ordering::Relaxed);
        Self::from_key(TokenKey::Unique { id, description })
    }

    pub fn key(&self) -> &TokenKey {
        &self.key
    }

    pub(crate) fn from_key(key: TokenKey) -> Self {
        Token {
            key,
            _marker: PhantomData,
        }
    }
}

impl<T: Injectable> Token<T> {
    /// Token identified by the produced type itself
    pub fn of_type() -> Self {
        Self::from_key(TokenKey::Type(TypeInfo::of::<T>()))
    }
}

impl<T: ?Sized> Clone for Token<T> {
    fn clone(&self) -> Self {
        Self::from_key(self.key.clone())
    }
}
impl<T: ?Sized> PartialEq for Token<T> {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}
impl<T: ?Sized> Eq for Token<T> {}
impl<T: ?Sized> Hash for Token<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}
impl<T: ?Sized> Debug for Token<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Token").field(&self.key).finish()
    }
}
impl<T: ?Sized> Display for Token<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.key, f)
    }
}
impl<T: ?Sized> AsRef<TokenKey> for Token<T> {
    fn as_ref(&self) -> &TokenKey {
        &self.key
    }
}
impl<T: ?Sized> From<&Token<T>> for TokenKey {
    fn from(token: &Token<T>) -> Self {
        token.key.clone()
    }
}

/// Joins keys for diagnostics
pub(crate) fn join_keys(keys: &[TokenKey], separator: &str) -> String {
    if keys.is_empty() {
        return "<none>".to_string();
    }
    keys.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(separator)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Service;

    #[test]
    fn named_tokens_compare_by_name() {
        let a = Token::<Service>::named("service");
        let b = Token::<Service>::named(String::from("service"));
        assert_eq!(a, b);
        assert_eq!(a.key(), &TokenKey::Named(Cow::Borrowed("service")));
    }

    #[test]
    fn unique_tokens_never_collide() {
        let a = Token::<Service>::unique("service");
        let b = Token::<Service>::unique("service");
        assert_ne!(a, b);
        assert_eq!(a, a.clone());
    }

    #[test]
    fn type_tokens_use_type_identity() {
        assert_eq!(Token::<Service>::of_type(), Token::<Service>::of_type());
        assert_ne!(
            Token::<Service>::of_type().key(),
            Token::<String>::of_type().key()
        );
        assert!(Token::<Service>::of_type().to_string().ends_with("Service"));
    }

    #[test]
    fn join_keys_handles_empty_lists() {
        assert_eq!(join_keys(&[], ", "), "<none>");
        let keys = [
            TokenKey::Named("a".into()),
            TokenKey::Named("b".into()),
        ];
        assert_eq!(join_keys(&keys, " -> "), "a -> b");
    }
}
