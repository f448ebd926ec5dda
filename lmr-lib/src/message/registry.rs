use std::collections::HashMap;
use std::fmt;

use tracing::debug;

use super::{DecodedMessage, Discriminator, MessageKind, MessageMeta};
use crate::{bits::BitFrame, Error, Result};

/// Builds the typed content of a message from its corrected payload bits.
pub type Constructor = Box<dyn Fn(&BitFrame) -> MessageKind + Send + Sync>;

/// Maps a [Discriminator] to the constructor for its message type.
///
/// Populated once at startup and shared read-only by every channel. Registering a second
/// constructor for a discriminator is rejected with [Error::DuplicateDiscriminator] and
/// leaves the first registration in place.
#[derive(Default)]
pub struct Registry {
    constructors: HashMap<Discriminator, Constructor>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `constructor` for `discriminator`.
    ///
    /// # Errors
    /// [Error::DuplicateDiscriminator] if a constructor is already registered.
    pub fn register<F>(&mut self, discriminator: Discriminator, constructor: F) -> Result<()>
    where
        F: Fn(&BitFrame) -> MessageKind + Send + Sync + 'static,
    {
        if self.constructors.contains_key(&discriminator) {
            return Err(Error::DuplicateDiscriminator(discriminator.to_string()));
        }
        self.constructors
            .insert(discriminator, Box::new(constructor));
        Ok(())
    }

    pub fn contains(&self, discriminator: &Discriminator) -> bool {
        self.constructors.contains_key(discriminator)
    }

    pub fn len(&self) -> usize {
        self.constructors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constructors.is_empty()
    }

    /// Registered discriminators in sorted order.
    pub fn discriminators(&self) -> Vec<Discriminator> {
        let mut zult: Vec<Discriminator> = self.constructors.keys().copied().collect();
        zult.sort();
        zult
    }

    /// Build the message for `payload`. Unregistered discriminators produce
    /// [MessageKind::Unknown] carrying the payload unchanged.
    pub fn dispatch(
        &self,
        discriminator: Discriminator,
        payload: &BitFrame,
        meta: MessageMeta,
    ) -> DecodedMessage {
        let kind = match self.constructors.get(&discriminator) {
            Some(constructor) => constructor(payload),
            None => {
                debug!(%discriminator, class = %meta.class, "no constructor registered");
                MessageKind::Unknown
            }
        };
        DecodedMessage::new(meta, payload.clone(), discriminator, kind)
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("discriminators", &self.discriminators())
            .finish()
    }
}
