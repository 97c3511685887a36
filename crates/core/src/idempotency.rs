//! Idempotency keys for preview requests.
//!
//! A key identifies one logical generation: the same photo rendered in the
//! same style and orientation for the same user. Duplicate clicks produce
//! the same key, so both the engine and the provider can collapse them.

use crate::hashing::sha256_hex_parts;
use crate::style::Orientation;

/// Marker used in place of a user id for signed-out sessions.
pub const ANONYMOUS_USER: &str = "anon";

/// Version prefix mixed into every key; bump it to invalidate server-side
/// dedupe records after a breaking change in the request shape.
const KEY_VERSION: &str = "preview:v1";

/// Inputs to [`build_idempotency_key`].
#[derive(Debug, Clone, Copy)]
pub struct IdempotencyInput<'a> {
    pub style_id: &'a str,
    pub orientation: Orientation,
    pub image_hash: &'a str,
    /// `None` for anonymous sessions.
    pub user_id: Option<&'a str>,
}

/// Derive the deterministic idempotency key for a preview request.
pub fn build_idempotency_key(input: &IdempotencyInput<'_>) -> String {
    let user = input
        .user_id
        .filter(|id| !id.is_empty())
        .unwrap_or(ANONYMOUS_USER);
    sha256_hex_parts(&[
        KEY_VERSION,
        input.style_id,
        input.orientation.as_str(),
        input.image_hash,
        user,
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input<'a>(style: &'a str, orientation: Orientation, user: Option<&'a str>) -> IdempotencyInput<'a> {
        IdempotencyInput {
            style_id: style,
            orientation,
            image_hash: "abc123",
            user_id: user,
        }
    }

    #[test]
    fn same_inputs_same_key() {
        let a = build_idempotency_key(&input("oil", Orientation::Square, Some("u-1")));
        let b = build_idempotency_key(&input("oil", Orientation::Square, Some("u-1")));
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn every_component_changes_the_key() {
        let base = build_idempotency_key(&input("oil", Orientation::Square, Some("u-1")));
        assert_ne!(base, build_idempotency_key(&input("watercolor", Orientation::Square, Some("u-1"))));
        assert_ne!(base, build_idempotency_key(&input("oil", Orientation::Vertical, Some("u-1"))));
        assert_ne!(base, build_idempotency_key(&input("oil", Orientation::Square, Some("u-2"))));

        let mut other_image = input("oil", Orientation::Square, Some("u-1"));
        other_image.image_hash = "def456";
        assert_ne!(base, build_idempotency_key(&other_image));
    }

    #[test]
    fn empty_user_id_is_anonymous() {
        assert_eq!(
            build_idempotency_key(&input("oil", Orientation::Square, Some(""))),
            build_idempotency_key(&input("oil", Orientation::Square, None)),
        );
    }
}
