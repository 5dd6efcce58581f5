//! Scene registry
//!
//! Owns every scene object in a slot map and keeps an explicit index of the
//! objects carrying a [`SphereComponent`]. Spheres are registered when the
//! component is attached and deregistered when it is detached or the object
//! is despawned, so discovery is an iteration over the index rather than a
//! scan of the whole world.
//!
//! Registration order is preserved: it defines the sphere index space seen by
//! the shading program and stays stable while the topology is unchanged.

use slotmap::{new_key_type, SlotMap};

use super::sphere::SphereComponent;
use crate::foundation::math::Transform;

new_key_type! {
    /// Stable handle to an object in a [`SceneRegistry`]
    pub struct ObjectKey;
}

/// Scene registry errors
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum SceneError {
    /// Handle does not refer to a live object
    #[error("Unknown scene object {0:?}")]
    UnknownObject(ObjectKey),

    /// Reparenting would make an object its own ancestor
    #[error("Parenting {child:?} under {parent:?} would create a cycle")]
    Cycle {
        /// Object being reparented
        child: ObjectKey,
        /// Requested parent
        parent: ObjectKey,
    },
}

/// A node of the scene hierarchy
#[derive(Debug, Clone)]
pub struct SceneObject {
    /// Display name, used for container lookup
    pub name: String,
    /// Transform relative to the parent (or world when unparented)
    pub transform: Transform,
    /// Inactive objects and their descendants are skipped by discovery
    pub active: bool,
    parent: Option<ObjectKey>,
    children: Vec<ObjectKey>,
    sphere: Option<SphereComponent>,
    spawn_order: u64,
}

impl SceneObject {
    fn new(name: String, transform: Transform, spawn_order: u64) -> Self {
        Self {
            name,
            transform,
            active: true,
            spawn_order,
            parent: None,
            children: Vec::new(),
            sphere: None,
        }
    }

    /// Parent object, if any
    pub fn parent(&self) -> Option<ObjectKey> {
        self.parent
    }

    /// Direct children in insertion order
    pub fn children(&self) -> &[ObjectKey] {
        &self.children
    }

    /// Sphere capability, if attached
    pub fn sphere(&self) -> Option<&SphereComponent> {
        self.sphere.as_ref()
    }
}

/// Scene-owned object store with a sphere registration index
#[derive(Debug, Default)]
pub struct SceneRegistry {
    objects: SlotMap<ObjectKey, SceneObject>,
    spheres: Vec<ObjectKey>,
    spawned: u64,
}

impl SceneRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an unparented object
    pub fn spawn(&mut self, name: impl Into<String>, transform: Transform) -> ObjectKey {
        self.spawned += 1;
        self.objects.insert(SceneObject::new(name.into(), transform, self.spawned))
    }

    /// Create an object parented under `parent`
    pub fn spawn_child(
        &mut self,
        parent: ObjectKey,
        name: impl Into<String>,
        transform: Transform,
    ) -> Result<ObjectKey, SceneError> {
        if !self.objects.contains_key(parent) {
            return Err(SceneError::UnknownObject(parent));
        }
        let key = self.spawn(name, transform);
        self.link(parent, key);
        Ok(key)
    }

    /// Create an unparented sphere and register it
    pub fn spawn_sphere(
        &mut self,
        name: impl Into<String>,
        transform: Transform,
        sphere: SphereComponent,
    ) -> ObjectKey {
        let key = self.spawn(name, transform);
        self.objects[key].sphere = Some(sphere);
        self.spheres.push(key);
        key
    }

    /// Attach (or replace) the sphere capability of an object
    pub fn attach_sphere(&mut self, key: ObjectKey, sphere: SphereComponent) -> Result<(), SceneError> {
        let object = self.objects.get_mut(key).ok_or(SceneError::UnknownObject(key))?;
        if object.sphere.replace(sphere).is_none() {
            self.spheres.push(key);
        }
        Ok(())
    }

    /// Detach the sphere capability, deregistering the object
    pub fn detach_sphere(&mut self, key: ObjectKey) -> Result<Option<SphereComponent>, SceneError> {
        let object = self.objects.get_mut(key).ok_or(SceneError::UnknownObject(key))?;
        let removed = object.sphere.take();
        if removed.is_some() {
            self.spheres.retain(|&k| k != key);
        }
        Ok(removed)
    }

    /// Move `child` under `parent`, keeping its local transform
    pub fn set_parent(&mut self, child: ObjectKey, parent: Option<ObjectKey>) -> Result<(), SceneError> {
        if !self.objects.contains_key(child) {
            return Err(SceneError::UnknownObject(child));
        }
        if let Some(parent) = parent {
            if !self.objects.contains_key(parent) {
                return Err(SceneError::UnknownObject(parent));
            }
            if self.is_ancestor_or_self(child, parent) {
                return Err(SceneError::Cycle { child, parent });
            }
        }

        self.unlink(child);
        if let Some(parent) = parent {
            self.link(parent, child);
        }
        Ok(())
    }

    /// Remove an object and all of its descendants
    pub fn despawn(&mut self, key: ObjectKey) -> Result<(), SceneError> {
        if !self.objects.contains_key(key) {
            return Err(SceneError::UnknownObject(key));
        }
        self.unlink(key);

        let mut pending = vec![key];
        while let Some(current) = pending.pop() {
            if let Some(object) = self.objects.remove(current) {
                if object.sphere.is_some() {
                    self.spheres.retain(|&k| k != current);
                }
                pending.extend(object.children);
            }
        }
        log::trace!("Despawned scene object {:?}", key);
        Ok(())
    }

    /// Look up an object
    pub fn get(&self, key: ObjectKey) -> Option<&SceneObject> {
        self.objects.get(key)
    }

    /// Look up an object mutably (transform, material, active flag)
    pub fn get_mut(&mut self, key: ObjectKey) -> Option<&mut SceneObject> {
        self.objects.get_mut(key)
    }

    /// Mutable access to an object's sphere material
    pub fn sphere_mut(&mut self, key: ObjectKey) -> Option<&mut SphereComponent> {
        self.objects.get_mut(key)?.sphere.as_mut()
    }

    /// Enable or disable an object
    pub fn set_active(&mut self, key: ObjectKey, active: bool) -> Result<(), SceneError> {
        let object = self.objects.get_mut(key).ok_or(SceneError::UnknownObject(key))?;
        object.active = active;
        Ok(())
    }

    /// Oldest live object with the given name
    ///
    /// Freed slots are reused, so duplicates resolve by spawn order rather
    /// than slot position.
    pub fn find_by_name(&self, name: &str) -> Option<ObjectKey> {
        self.objects
            .iter()
            .filter(|(_, object)| object.name == name)
            .min_by_key(|(_, object)| object.spawn_order)
            .map(|(key, _)| key)
    }

    /// Direct children of `key` in insertion order
    pub fn children_of(&self, key: ObjectKey) -> Result<&[ObjectKey], SceneError> {
        self.objects
            .get(key)
            .map(SceneObject::children)
            .ok_or(SceneError::UnknownObject(key))
    }

    /// Registered spheres that are active in the hierarchy, in registration order
    pub fn active_spheres(&self) -> impl Iterator<Item = ObjectKey> + '_ {
        self.spheres
            .iter()
            .copied()
            .filter(|&key| self.is_active_in_hierarchy(key))
    }

    /// Number of registered spheres, active or not
    pub fn sphere_count(&self) -> usize {
        self.spheres.len()
    }

    /// Number of live objects
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Whether the registry holds no objects
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// An object is active in the hierarchy when it and all its ancestors are active
    pub fn is_active_in_hierarchy(&self, key: ObjectKey) -> bool {
        let mut current = Some(key);
        while let Some(k) = current {
            match self.objects.get(k) {
                Some(object) if object.active => current = object.parent,
                _ => return false,
            }
        }
        true
    }

    /// Compose the object's transform with all ancestor transforms
    pub fn world_transform(&self, key: ObjectKey) -> Result<Transform, SceneError> {
        let object = self.objects.get(key).ok_or(SceneError::UnknownObject(key))?;
        let mut world = object.transform.clone();
        let mut parent = object.parent;
        while let Some(p) = parent {
            let parent_object = self.objects.get(p).ok_or(SceneError::UnknownObject(p))?;
            world = parent_object.transform.combine(&world);
            parent = parent_object.parent;
        }
        Ok(world)
    }

    fn link(&mut self, parent: ObjectKey, child: ObjectKey) {
        self.objects[child].parent = Some(parent);
        self.objects[parent].children.push(child);
    }

    fn unlink(&mut self, child: ObjectKey) {
        if let Some(parent) = self.objects[child].parent.take() {
            if let Some(parent_object) = self.objects.get_mut(parent) {
                parent_object.children.retain(|&k| k != child);
            }
        }
    }

    fn is_ancestor_or_self(&self, ancestor: ObjectKey, mut key: ObjectKey) -> bool {
        loop {
            if key == ancestor {
                return true;
            }
            match self.objects.get(key).and_then(SceneObject::parent) {
                Some(parent) => key = parent,
                None => return false,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::Vec3;
    use crate::scene::SurfaceMaterial;
    use approx::assert_relative_eq;

    fn sphere() -> SphereComponent {
        SphereComponent::new(SurfaceMaterial::default())
    }

    #[test]
    fn test_registration_order_is_stable() {
        let mut scene = SceneRegistry::new();
        let a = scene.spawn_sphere("a", Transform::identity(), sphere());
        let b = scene.spawn_sphere("b", Transform::identity(), sphere());
        let c = scene.spawn_sphere("c", Transform::identity(), sphere());

        let first: Vec<_> = scene.active_spheres().collect();
        let second: Vec<_> = scene.active_spheres().collect();
        assert_eq!(first, vec![a, b, c]);
        assert_eq!(first, second);
    }

    #[test]
    fn test_detach_and_despawn_deregister() {
        let mut scene = SceneRegistry::new();
        let a = scene.spawn_sphere("a", Transform::identity(), sphere());
        let b = scene.spawn_sphere("b", Transform::identity(), sphere());

        scene.detach_sphere(a).unwrap();
        assert_eq!(scene.active_spheres().collect::<Vec<_>>(), vec![b]);

        scene.despawn(b).unwrap();
        assert_eq!(scene.sphere_count(), 0);
        assert!(scene.get(b).is_none());
    }

    #[test]
    fn test_attach_twice_registers_once() {
        let mut scene = SceneRegistry::new();
        let key = scene.spawn("plain", Transform::identity());
        scene.attach_sphere(key, sphere()).unwrap();
        scene.attach_sphere(key, sphere()).unwrap();
        assert_eq!(scene.sphere_count(), 1);
    }

    #[test]
    fn test_inactive_parent_hides_children() {
        let mut scene = SceneRegistry::new();
        let root = scene.spawn("Spheres", Transform::identity());
        let child = scene.spawn_child(root, "ball", Transform::identity()).unwrap();
        scene.attach_sphere(child, sphere()).unwrap();

        assert_eq!(scene.active_spheres().count(), 1);
        scene.set_active(root, false).unwrap();
        assert_eq!(scene.active_spheres().count(), 0);
    }

    #[test]
    fn test_despawn_removes_descendants() {
        let mut scene = SceneRegistry::new();
        let root = scene.spawn("root", Transform::identity());
        let child = scene.spawn_child(root, "child", Transform::identity()).unwrap();
        scene.attach_sphere(child, sphere()).unwrap();

        scene.despawn(root).unwrap();
        assert!(scene.is_empty());
        assert_eq!(scene.sphere_count(), 0);
    }

    #[test]
    fn test_world_transform_composes_parents() {
        let mut scene = SceneRegistry::new();
        let root = scene.spawn("root", Transform::from_position_scale(Vec3::new(0.0, 0.0, -5.0), 2.0));
        let child = scene
            .spawn_child(root, "child", Transform::from_position(Vec3::new(1.0, 0.0, 0.0)))
            .unwrap();

        let world = scene.world_transform(child).unwrap();
        assert_relative_eq!(world.position, Vec3::new(2.0, 0.0, -5.0));
        assert_relative_eq!(world.scale, Vec3::new(2.0, 2.0, 2.0));
    }

    #[test]
    fn test_set_parent_rejects_cycles() {
        let mut scene = SceneRegistry::new();
        let a = scene.spawn("a", Transform::identity());
        let b = scene.spawn_child(a, "b", Transform::identity()).unwrap();

        assert_eq!(scene.set_parent(a, Some(b)), Err(SceneError::Cycle { child: a, parent: b }));
        scene.set_parent(b, None).unwrap();
        assert!(scene.children_of(a).unwrap().is_empty());
    }

    #[test]
    fn test_find_by_name() {
        let mut scene = SceneRegistry::new();
        let container = scene.spawn("Spheres", Transform::identity());
        assert_eq!(scene.find_by_name("Spheres"), Some(container));
        assert_eq!(scene.find_by_name("Missing"), None);
    }

    #[test]
    fn test_find_by_name_prefers_oldest_after_slot_reuse() {
        let mut scene = SceneRegistry::new();
        let scratch = scene.spawn("Scratch", Transform::identity());
        let original = scene.spawn("Spheres", Transform::identity());
        scene.despawn(scratch).unwrap();
        let duplicate = scene.spawn("Spheres", Transform::identity());

        assert_ne!(duplicate, original);
        assert_eq!(scene.find_by_name("Spheres"), Some(original));

        scene.despawn(original).unwrap();
        assert_eq!(scene.find_by_name("Spheres"), Some(duplicate));
    }

    #[test]
    fn test_sphere_mut_edits_registered_material() {
        let mut scene = SceneRegistry::new();
        let ball = scene.spawn_sphere("Ball", Transform::identity(), sphere());
        let plain = scene.spawn("Plain", Transform::identity());

        scene.sphere_mut(ball).unwrap().material = SurfaceMaterial::diffuse(0.0, 0.0, 1.0);
        assert_eq!(
            scene.get(ball).and_then(SceneObject::sphere).map(|s| s.material.color),
            Some(SurfaceMaterial::diffuse(0.0, 0.0, 1.0).color)
        );
        assert!(scene.sphere_mut(plain).is_none());
    }
}
