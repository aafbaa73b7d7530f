
use crate::types::{CategoryRef, Episode};

pub(super) fn episode(name: &str) -> Episode {
    Episode::new(
        CategoryRef::new("arte", "42", "ShowX").with_extension("mp4"),
        name,
        format!("http://arte/{name}"),
    )
}
