//! Scene marshaling for the shading program
//!
//! Collects live sphere primitives from the [`SceneRegistry`] and serializes
//! them into the structured-buffer layout the paired shading program
//! declares. The layout is configuration, not a constant: older programs
//! read an 8-float material block, newer ones add roughness.
//!
//! Record layouts (all fields native-endian `f32`, 16-byte aligned blocks):
//!
//! ```text
//! Basic          [x y z radius][r g b a][er eg eb strength]            48 bytes
//! WithRoughness  [x y z radius][r g b a][er eg eb strength][rough _ _ _] 64 bytes
//! ```
//!
//! Nothing is cached between frames; every call re-reads transforms and
//! materials because primitives may move.

use bytemuck::{Pod, Zeroable};
use serde::{Serialize, Deserialize};

use crate::foundation::math::Vec3;
use crate::scene::{DiscoveryScope, ObjectKey, SceneError, SceneRegistry, SurfaceMaterial, MATERIAL_CHANNELS};

/// Tolerance used to flag non-uniform sphere scale
const UNIFORM_SCALE_EPSILON: f32 = 1e-4;

/// Marshaling failures
///
/// These are configuration errors: skipping an offending object would make
/// the sphere count disagree with what the shading program expects.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum MarshalError {
    /// A discovered object lacks the sphere capability
    #[error("Object '{name}' ({key:?}) is discovered as a sphere but has no sphere component")]
    MissingSphereComponent {
        /// Offending object
        key: ObjectKey,
        /// Object name
        name: String,
    },

    /// The configured discovery container does not exist
    #[error("Discovery container '{0}' not found")]
    ContainerNotFound(String),

    /// Scene lookup failed
    #[error(transparent)]
    Scene(#[from] SceneError),

    /// A byte buffer is not a whole number of records
    #[error("Buffer of {len} bytes is not a multiple of the {stride}-byte record stride")]
    MisalignedBuffer {
        /// Buffer length in bytes
        len: usize,
        /// Record stride in bytes
        stride: usize,
    },
}

/// Serialized record layout expected by the shading program
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum RecordLayout {
    /// Position, radius, color and emission (48-byte stride)
    Basic,
    /// Basic plus roughness, padded to 16 bytes (64-byte stride)
    #[default]
    WithRoughness,
}

impl RecordLayout {
    /// Byte distance between consecutive records
    pub const fn stride(self) -> usize {
        match self {
            Self::Basic => std::mem::size_of::<BasicSphereRecord>(),
            Self::WithRoughness => std::mem::size_of::<RoughSphereRecord>(),
        }
    }

    /// Number of material channels carried per record
    pub const fn material_channels(self) -> usize {
        match self {
            Self::Basic => MATERIAL_CHANNELS - 1,
            Self::WithRoughness => MATERIAL_CHANNELS,
        }
    }
}

/// Positional block: center and radius
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct PositionBlock {
    /// World-space center
    pub position: [f32; 3],
    /// Radius
    pub radius: f32,
}

/// Material block without roughness (32 bytes)
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct BasicMaterialBlock {
    /// Base color RGBA
    pub color: [f32; 4],
    /// Emission color RGB
    pub emission_color: [f32; 3],
    /// Emission strength
    pub emission_strength: f32,
}

/// Material block with roughness (48 bytes)
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct RoughMaterialBlock {
    /// Base color RGBA
    pub color: [f32; 4],
    /// Emission color RGB
    pub emission_color: [f32; 3],
    /// Emission strength
    pub emission_strength: f32,
    /// Roughness in [0, 1]
    pub roughness: f32,
    /// Padding to the next 16-byte boundary
    pub _padding: [f32; 3],
}

/// Sphere record for [`RecordLayout::Basic`]
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct BasicSphereRecord {
    /// Center and radius
    pub position: PositionBlock,
    /// Material
    pub material: BasicMaterialBlock,
}

/// Sphere record for [`RecordLayout::WithRoughness`]
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct RoughSphereRecord {
    /// Center and radius
    pub position: PositionBlock,
    /// Material
    pub material: RoughMaterialBlock,
}

/// Snapshot of one sphere for the current frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpherePrimitive {
    /// World-space center
    pub position: Vec3,
    /// Radius (half the object's world scale along X)
    pub radius: f32,
    /// Surface material
    pub material: SurfaceMaterial,
}

impl SpherePrimitive {
    fn position_block(&self) -> PositionBlock {
        PositionBlock {
            position: [self.position.x, self.position.y, self.position.z],
            radius: self.radius,
        }
    }

    fn to_basic(self) -> BasicSphereRecord {
        let c = self.material.channels();
        BasicSphereRecord {
            position: self.position_block(),
            material: BasicMaterialBlock {
                color: [c[0], c[1], c[2], c[3]],
                emission_color: [c[4], c[5], c[6]],
                emission_strength: c[7],
            },
        }
    }

    fn to_rough(self) -> RoughSphereRecord {
        let c = self.material.channels();
        RoughSphereRecord {
            position: self.position_block(),
            material: RoughMaterialBlock {
                color: [c[0], c[1], c[2], c[3]],
                emission_color: [c[4], c[5], c[6]],
                emission_strength: c[7],
                roughness: c[8],
                _padding: [0.0; 3],
            },
        }
    }

    fn from_position(block: &PositionBlock, channels: [f32; MATERIAL_CHANNELS]) -> Self {
        Self {
            position: Vec3::from(block.position),
            radius: block.radius,
            material: SurfaceMaterial::from_channels(&channels),
        }
    }
}

impl From<&BasicSphereRecord> for SpherePrimitive {
    fn from(record: &BasicSphereRecord) -> Self {
        let m = &record.material;
        let [r, g, b, a] = m.color;
        let [er, eg, eb] = m.emission_color;
        Self::from_position(&record.position, [r, g, b, a, er, eg, eb, m.emission_strength, 0.0])
    }
}

impl From<&RoughSphereRecord> for SpherePrimitive {
    fn from(record: &RoughSphereRecord) -> Self {
        let m = &record.material;
        let [r, g, b, a] = m.color;
        let [er, eg, eb] = m.emission_color;
        Self::from_position(&record.position, [r, g, b, a, er, eg, eb, m.emission_strength, m.roughness])
    }
}

/// Serialized sphere records for one frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SceneBuffer {
    layout: RecordLayout,
    count: usize,
    bytes: Vec<u8>,
}

impl SceneBuffer {
    /// Serialize primitives in order using `layout`
    pub fn serialize(primitives: &[SpherePrimitive], layout: RecordLayout) -> Self {
        let bytes = match layout {
            RecordLayout::Basic => {
                let records: Vec<BasicSphereRecord> = primitives.iter().map(|p| p.to_basic()).collect();
                bytemuck::cast_slice(&records).to_vec()
            }
            RecordLayout::WithRoughness => {
                let records: Vec<RoughSphereRecord> = primitives.iter().map(|p| p.to_rough()).collect();
                bytemuck::cast_slice(&records).to_vec()
            }
        };

        Self {
            layout,
            count: primitives.len(),
            bytes,
        }
    }

    /// Decode records from raw bytes, as the shading program reads them
    pub fn decode(bytes: &[u8], layout: RecordLayout) -> Result<Vec<SpherePrimitive>, MarshalError> {
        let stride = layout.stride();
        if bytes.len() % stride != 0 {
            return Err(MarshalError::MisalignedBuffer { len: bytes.len(), stride });
        }

        let primitives = bytes
            .chunks_exact(stride)
            .map(|chunk| match layout {
                RecordLayout::Basic => SpherePrimitive::from(&bytemuck::pod_read_unaligned::<BasicSphereRecord>(chunk)),
                RecordLayout::WithRoughness => {
                    SpherePrimitive::from(&bytemuck::pod_read_unaligned::<RoughSphereRecord>(chunk))
                }
            })
            .collect();
        Ok(primitives)
    }

    /// Record layout
    pub fn layout(&self) -> RecordLayout {
        self.layout
    }

    /// Number of records
    pub fn count(&self) -> usize {
        self.count
    }

    /// Byte distance between records
    pub fn stride(&self) -> usize {
        self.layout.stride()
    }

    /// Serialized bytes (`count * stride` long)
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Length in bytes
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether the buffer holds no records
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Collects and serializes sphere primitives
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SceneMarshaler {
    discovery: DiscoveryScope,
    layout: RecordLayout,
}

impl SceneMarshaler {
    /// Create a marshaler for the given discovery policy and layout
    pub fn new(discovery: DiscoveryScope, layout: RecordLayout) -> Self {
        Self { discovery, layout }
    }

    /// Discovery policy
    pub fn discovery(&self) -> &DiscoveryScope {
        &self.discovery
    }

    /// Record layout
    pub fn layout(&self) -> RecordLayout {
        self.layout
    }

    /// Discover spheres and snapshot their live state, in discovery order
    pub fn collect(&self, scene: &SceneRegistry) -> Result<Vec<SpherePrimitive>, MarshalError> {
        let keys: Vec<ObjectKey> = match &self.discovery {
            DiscoveryScope::Global => scene.active_spheres().collect(),
            DiscoveryScope::ChildrenOf { container } => {
                let root = scene
                    .find_by_name(container)
                    .ok_or_else(|| MarshalError::ContainerNotFound(container.clone()))?;
                scene
                    .children_of(root)?
                    .iter()
                    .copied()
                    .filter(|&key| scene.is_active_in_hierarchy(key))
                    .collect()
            }
        };

        keys.into_iter().map(|key| Self::snapshot(scene, key)).collect()
    }

    /// Serialize already-collected primitives with this marshaler's layout
    pub fn serialize(&self, primitives: &[SpherePrimitive]) -> SceneBuffer {
        SceneBuffer::serialize(primitives, self.layout)
    }

    /// Collect and serialize in one step
    pub fn marshal(&self, scene: &SceneRegistry) -> Result<SceneBuffer, MarshalError> {
        let primitives = self.collect(scene)?;
        let buffer = self.serialize(&primitives);
        log::trace!("Marshaled {} spheres into {} bytes", buffer.count(), buffer.len());
        Ok(buffer)
    }

    fn snapshot(scene: &SceneRegistry, key: ObjectKey) -> Result<SpherePrimitive, MarshalError> {
        let object = scene.get(key).ok_or(SceneError::UnknownObject(key))?;
        let sphere = object.sphere().ok_or_else(|| MarshalError::MissingSphereComponent {
            key,
            name: object.name.clone(),
        })?;
        let world = scene.world_transform(key)?;

        // Only uniform scale is supported; X decides the radius.
        if !world.has_uniform_scale(UNIFORM_SCALE_EPSILON) {
            log::warn!(
                "Sphere '{}' has non-uniform scale {:?}; using X for the radius",
                object.name,
                world.scale
            );
        }

        Ok(SpherePrimitive {
            position: world.position,
            radius: world.scale.x * 0.5,
            material: sphere.material,
        })
    }
}

impl Default for SceneMarshaler {
    fn default() -> Self {
        Self::new(DiscoveryScope::default(), RecordLayout::default())
    }
}
