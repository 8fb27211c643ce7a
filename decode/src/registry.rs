//! Extension tag registry
//!
//! Maps a numeric extension type tag to the function that decodes that
//! extension structure. The table is built once from an explicit list of
//! registrations and only read afterwards; every decode function shares one
//! signature, so generated, hand-written and test decoders are
//! interchangeable values.
//!
//! ```ignore
//! static REGISTRY: LazyLock<ExtensionRegistry> = LazyLock::new(|| {
//!     ExtensionRegistry::new(&[
//!         register::<PhysicalDeviceFeatures2>(1000059000, "PhysicalDeviceFeatures2"),
//!         register::<DeviceGroupDeviceCreateInfo>(1000070001, "DeviceGroupDeviceCreateInfo"),
//!     ])
//!     .expect("duplicate extension tag")
//! });
//! ```

use std::any::Any;
use std::fmt;

use hashbrown::HashMap;

use crate::context::DecodeContext;
use crate::cursor::ByteCursor;
use crate::error::DecodeError;
use crate::value::Decode;

/// A decoded extension structure, stored type-erased in a chain
pub trait ExtensionStruct: Any + fmt::Debug + Send + Sync {
    fn as_any(&self) -> &dyn Any;
}

impl<T: Any + fmt::Debug + Send + Sync> ExtensionStruct for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Uniform signature of every extension decode function
pub type ExtensionDecodeFn = fn(
    &mut ByteCursor<'_>,
    &mut DecodeContext<'_>,
) -> Result<Box<dyn ExtensionStruct>, DecodeError>;

/// One `tag -> decode function` entry
#[derive(Clone, Copy)]
pub struct ExtensionRegistration {
    pub tag: u32,
    pub name: &'static str,
    pub decode: ExtensionDecodeFn,
}

impl fmt::Debug for ExtensionRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtensionRegistration")
            .field("tag", &self.tag)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

fn decode_boxed<T>(
    cursor: &mut ByteCursor<'_>,
    ctx: &mut DecodeContext<'_>,
) -> Result<Box<dyn ExtensionStruct>, DecodeError>
where
    T: Decode + ExtensionStruct,
{
    Ok(Box::new(T::decode(cursor, ctx)?))
}

/// Registration that decodes `T` through its [`Decode`] impl
pub fn register<T>(tag: u32, name: &'static str) -> ExtensionRegistration
where
    T: Decode + ExtensionStruct,
{
    ExtensionRegistration {
        tag,
        name,
        decode: decode_boxed::<T>,
    }
}

/// Error building a registry
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("extension tag {tag} registered twice ('{first}' and '{second}')")]
    DuplicateTag {
        tag: u32,
        first: &'static str,
        second: &'static str,
    },
}

/// Immutable lookup table from extension tag to decode function
#[derive(Debug, Default)]
pub struct ExtensionRegistry {
    entries: HashMap<u32, ExtensionRegistration>,
}

impl ExtensionRegistry {
    /// Build from a finite registration list
    pub fn new(registrations: &[ExtensionRegistration]) -> Result<Self, RegistryError> {
        let mut entries = HashMap::with_capacity(registrations.len());
        for registration in registrations {
            if let Some(existing) = entries.insert(registration.tag, *registration) {
                return Err(RegistryError::DuplicateTag {
                    tag: registration.tag,
                    first: existing.name,
                    second: registration.name,
                });
            }
        }
        Ok(Self { entries })
    }

    /// Registry that knows no extensions; every node is preserved opaquely
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn get(&self, tag: u32) -> Option<&ExtensionRegistration> {
        self.entries.get(&tag)
    }

    pub fn contains(&self, tag: u32) -> bool {
        self.entries.contains_key(&tag)
    }

    /// Registered tags in ascending order
    pub fn tags(&self) -> Vec<u32> {
        let mut tags: Vec<u32> = self.entries.keys().copied().collect();
        tags.sort_unstable();
        tags
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
