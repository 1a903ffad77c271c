//! Websites by package name. One `Registry` is created at start-up and
//! passed to whatever needs to declare or find a site.

use log::debug;
use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

use crate::{
    exception::Exception,
    util::{read_lock, write_lock},
    website::Website,
};

#[derive(Default)]
pub struct Registry {
    websites: RwLock<HashMap<String, Arc<Website>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The website for `package_name`, created on first declaration.
    pub fn declare_website(&self, package_name: &str) -> Result<Arc<Website>, Exception> {
        if package_name.trim().is_empty() {
            return Err(Exception::EmptyPackageName);
        }
        let mut websites = write_lock(&self.websites);
        let website = websites.entry(package_name.to_string()).or_insert_with(|| {
            debug!("Declaring website {:?}", package_name);
            Arc::new(Website::new(package_name))
        });
        Ok(Arc::clone(website))
    }

    pub fn lookup_website(&self, package_name: &str) -> Option<Arc<Website>> {
        read_lock(&self.websites).get(package_name).cloned()
    }

    pub fn websites(&self) -> Vec<Arc<Website>> {
        let mut websites: Vec<_> = read_lock(&self.websites).values().cloned().collect();
        websites.sort_by(|a, b| a.package_name().cmp(b.package_name()));
        websites
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_declare_is_idempotent() {
        let registry = Registry::new();
        let a = registry.declare_website("site").unwrap();
        let b = registry.declare_website("site").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert!(registry.lookup_website("other").is_none());
        assert!(matches!(
            registry.declare_website(" "),
            Err(Exception::EmptyPackageName)
        ));
    }

    #[test]
    fn test_concurrent_declarations_share_one_site() {
        let registry = Arc::new(Registry::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let registry = Arc::clone(&registry);
                thread::spawn(move || {
                    registry.declare_website(if i % 2 == 0 { "even" } else { "odd" }).unwrap()
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        let names: Vec<_> = registry
            .websites()
            .iter()
            .map(|w| w.package_name().to_string())
            .collect();
        assert_eq!(names, vec!["even", "odd"]);
    }
}
