use crate::SizeLimit;

/// Restrictions applied while decoding: size limits and an optional
/// allowlist of acceptable field names.
///
/// # Examples
///
/// ```
/// use formpart::{Constraints, SizeLimit};
///
/// let constraints = Constraints::new()
///     .size_limit(
///         SizeLimit::new()
///             .whole_stream(15 * 1024 * 1024)
///             .per_field(10 * 1024 * 1024)
///             .for_field("avatar", 3 * 1024 * 1024),
///     )
///     .allowed_fields(vec!["username", "avatar"]);
/// ```
pub struct Constraints {
    pub(crate) size_limit: SizeLimit,
    pub(crate) allowed_fields: Option<Vec<String>>,
}

impl Constraints {
    /// Creates a set of constraints with no allowlist and default size
    /// limits.
    pub fn new() -> Constraints {
        Constraints::default()
    }

    /// Applies the given size limits.
    pub fn size_limit(mut self, size_limit: SizeLimit) -> Constraints {
        self.size_limit = size_limit;
        self
    }

    /// Restricts decoding to parts whose field name appears in the list;
    /// any other part fails the decode with
    /// [`Error::UnknownField`](crate::Error::UnknownField).
    pub fn allowed_fields<N: Into<String>>(mut self, allowed_fields: Vec<N>) -> Constraints {
        self.allowed_fields = Some(allowed_fields.into_iter().map(|field| field.into()).collect());
        self
    }

    pub(crate) fn is_it_allowed(&self, field: Option<&str>) -> bool {
        match &self.allowed_fields {
            Some(allowed_fields) => field
                .map(|field| allowed_fields.iter().any(|allowed| allowed == field))
                .unwrap_or(false),
            None => true,
        }
    }
}

impl Default for Constraints {
    fn default() -> Self {
        Constraints {
            size_limit: SizeLimit::default(),
            allowed_fields: None,
        }
    }
}
