//! Model identifier to product name lookup.
//!
//! The registry is built once from the built-in table plus any overrides
//! from the configuration file and is read-only afterwards.

use smol_str::{SmolStr, format_smolstr};

/// Known models, keyed by the little-endian id at offsets 3..=4
const KNOWN_MODELS: &[(u16, &str)] = &[
   (8194, "AirPods"),
   (8195, "Powerbeats"),
   (8197, "BeatsX"),
   (8198, "Beats Solo³"),
   (8199, "Beats Studio³"),
   (8201, "Beats Studio³"),
   (8203, "Powerbeats Pro"),
   (8204, "Beats Solo Pro"),
   (8205, "Powerbeats"),
   (8206, "AirPods Pro"),
   (8207, "AirPods (2nd gen.)"),
];

/// Immutable mapping from model identifier to product name.
#[derive(Debug, Clone)]
pub struct DeviceRegistry {
   // Sorted by id
   models: Vec<(u16, SmolStr)>,
}

impl Default for DeviceRegistry {
   fn default() -> Self {
      Self::builtin()
   }
}

impl DeviceRegistry {
   /// Registry holding only the built-in model table.
   pub fn builtin() -> Self {
      Self::with_overrides(std::iter::empty::<(u16, SmolStr)>())
   }

   /// Built-in table extended by `overrides`; an override replaces the
   /// built-in name for the same id.
   pub fn with_overrides<I, S>(overrides: I) -> Self
   where
      I: IntoIterator<Item = (u16, S)>,
      S: Into<SmolStr>,
   {
      let mut models: Vec<(u16, SmolStr)> = KNOWN_MODELS
         .iter()
         .map(|&(id, name)| (id, SmolStr::new_static(name)))
         .collect();

      for (id, name) in overrides {
         let name = name.into();
         match models.binary_search_by_key(&id, |(k, _)| *k) {
            Ok(i) => models[i].1 = name,
            Err(i) => models.insert(i, (id, name)),
         }
      }
      Self { models }
   }

   pub fn try_resolve_name(&self, id: u16) -> Option<&SmolStr> {
      let i = self.models.binary_search_by_key(&id, |(k, _)| *k).ok()?;
      Some(&self.models[i].1)
   }

   /// Resolves `id` to a product name, `Unknown (<id>)` if not registered.
   pub fn resolve_name(&self, id: u16) -> SmolStr {
      match self.try_resolve_name(id) {
         Some(name) => name.clone(),
         None => format_smolstr!("Unknown ({id})"),
      }
   }

   pub fn len(&self) -> usize {
      self.models.len()
   }

   pub fn is_empty(&self) -> bool {
      self.models.is_empty()
   }
}
