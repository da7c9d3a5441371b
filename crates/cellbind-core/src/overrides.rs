//! Temporary overrides of string variable maps.
//!
//! Build tools read settings such as `CC` or `CFLAGS` from a shared map. A
//! cell build can override some of them for its own duration and have the
//! map restored afterwards.

use std::collections::HashMap;
use std::ops::{Deref, DerefMut};

/// Restores overridden entries when dropped.
///
/// Keys that did not exist before are removed again; existing keys get
/// their previous value back. Other changes made through the guard stay.
#[must_use = "overrides are reverted as soon as the guard is dropped"]
pub struct OverrideGuard<'a> {
    target: &'a mut HashMap<String, String>,
    saved: Vec<(String, Option<String>)>,
}

/// Apply every `Some` value in `overrides` to `target` until the guard drops.
///
/// `None` values are skipped, so optional settings can be passed through
/// without filtering them first.
pub fn override_vars<'a, I, K, V>(
    target: &'a mut HashMap<String, String>,
    overrides: I,
) -> OverrideGuard<'a>
where
    I: IntoIterator<Item = (K, Option<V>)>,
    K: Into<String>,
    V: Into<String>,
{
    let mut saved: Vec<(String, Option<String>)> = Vec::new();
    for (key, value) in overrides {
        let Some(value) = value else {
            continue;
        };
        let key = key.into();
        let previous = target.insert(key.clone(), value.into());
        // Only the first write of a key knows its pre-guard value
        if !saved.iter().any(|(saved_key, _)| *saved_key == key) {
            saved.push((key, previous));
        }
    }
    OverrideGuard { target, saved }
}

impl Deref for OverrideGuard<'_> {
    type Target = HashMap<String, String>;

    fn deref(&self) -> &Self::Target {
        &*self.target
    }
}

impl DerefMut for OverrideGuard<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut *self.target
    }
}

impl Drop for OverrideGuard<'_> {
    fn drop(&mut self) {
        for (key, previous) in self.saved.drain(..) {
            match previous {
                Some(value) => {
                    self.target.insert(key, value);
                }
                None => {
                    self.target.remove(&key);
                }
            }
        }
    }
}
