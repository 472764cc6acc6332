//! SC-011: BLAKE3 digests of recipe sources and evaluated plans.
//!
//! An executor can compare plan digests between runs to skip unchanged work.

use super::types::{Node, Recipe};

/// Hash a string. Returns `"blake3:{hex}"`.
pub fn hash_string(s: &str) -> String {
    format!("blake3:{}", blake3::hash(s.as_bytes()).to_hex())
}

/// Digest of a recipe subtree: origin, declaration order, kinds, names and
/// normalized attributes. Scopes are not part of the digest.
pub fn hash_recipe(recipe: &Recipe) -> String {
    let mut hasher = blake3::Hasher::new();
    feed_recipe(&mut hasher, recipe);
    format!("blake3:{}", hasher.finalize().to_hex())
}

fn feed_recipe(hasher: &mut blake3::Hasher, recipe: &Recipe) {
    hasher.update(recipe.origin().to_string().as_bytes());
    hasher.update(b"\n");
    for node in recipe.children() {
        match node {
            Node::Resource(r) => {
                hasher.update(r.kind.as_bytes());
                hasher.update(b"\0");
                hasher.update(r.name.as_bytes());
                hasher.update(b"\0");
                let attrs = serde_yaml_ng::to_string(&r.attributes)
                    .unwrap_or_else(|_| format!("{:?}", r.attributes));
                hasher.update(attrs.as_bytes());
                hasher.update(b"\n");
            }
            Node::Recipe(child) => {
                hasher.update(b"{\n");
                feed_recipe(hasher, child);
                hasher.update(b"}\n");
            }
        }
    }
}
