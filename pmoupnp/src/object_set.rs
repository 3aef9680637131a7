use std::sync::Arc;

use crate::{UpnpObjectSet, UpnpObjectSetError, UpnpTyped};

impl<T: UpnpTyped> Default for UpnpObjectSet<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: UpnpTyped> UpnpObjectSet<T> {
    pub fn new() -> Self {
        Self {
            objects: Default::default(),
            order: Default::default(),
        }
    }

    /// Insère un objet dans le set.
    ///
    /// # Returns
    ///
    /// * `Err(UpnpObjectSetError::AlreadyExists)` - Si un objet avec le même nom existe déjà
    pub fn insert(&self, object: Arc<T>) -> Result<(), UpnpObjectSetError> {
        let key = object.get_name().to_string();
        let mut objects = self.objects.write();

        if objects.contains_key(&key) {
            return Err(UpnpObjectSetError::AlreadyExists(key));
        }

        objects.insert(key.clone(), object);
        self.order.write().push(key);
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.objects.read().contains_key(name)
    }

    /// Récupère un objet par son nom.
    pub fn get_by_name(&self, name: &str) -> Option<Arc<T>> {
        self.objects.read().get(name).cloned()
    }

    /// Retourne tous les objets dans l'ordre d'insertion.
    pub fn all(&self) -> Vec<Arc<T>> {
        let objects = self.objects.read();
        self.order
            .read()
            .iter()
            .filter_map(|name| objects.get(name).cloned())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.order.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
