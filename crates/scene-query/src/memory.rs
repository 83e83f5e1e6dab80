//! In-memory [`SceneProvider`] for tests and fixtures.
//!
//! `MemoryScene` models a small host scene: a hierarchy of named, typed
//! objects with attributes and dependency edges. Objects are addressed by
//! fully-qualified path (`|root|child`); a bare leaf name resolves to the
//! first object with that name.
//!
//! Every provider call is recorded so tests can assert how many host calls an
//! evaluation issued, and the scene can be switched offline to exercise
//! provider failures.
//!
//! ```
//! use scene_query::memory::MemoryScene;
//! use scene_query::meshes;
//!
//! let mut scene = MemoryScene::new();
//! let body = scene.spawn("transform", "body", None);
//! scene.spawn("mesh", "bodyShape", Some(&body));
//!
//! let shapes = meshes().evaluate(&scene)?;
//! assert_eq!(shapes.len(), 1);
//! assert_eq!(scene.call_count(), 1);
//! # Ok::<(), scene_query::QueryError>(())
//! ```

use hashbrown::{HashMap, HashSet};
use parking_lot::Mutex;
use regex::Regex;

use crate::error::{ProviderError, ProviderResult};
use crate::id::{ObjectId, PATH_SEPARATOR, TypeSet};
use crate::provider::{RelativeKind, SceneProvider, WORLD_POSITION_ATTRIBUTE};
use crate::value::{Value, Vec3};

/// A recorded provider call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderCall {
    Enumerate {
        types: TypeSet,
        pattern: Option<String>,
    },
    Relatives {
        kind: RelativeKind,
        batch: usize,
        full_path: bool,
    },
    History {
        batch: usize,
    },
    Future {
        batch: usize,
    },
    GetAttribute {
        object: ObjectId,
        attribute: String,
    },
    WorldPositions {
        batch: usize,
    },
}

impl ProviderCall {
    /// Whether this call covers a whole batch (everything but attribute reads).
    #[must_use]
    pub fn is_batched(&self) -> bool {
        !matches!(self, Self::GetAttribute { .. })
    }
}

#[derive(Debug, Clone)]
struct SceneNode {
    type_name: String,
    parent: Option<ObjectId>,
    children: Vec<ObjectId>,
    attributes: HashMap<String, Value>,
    /// Upstream dependencies (history edges).
    inputs: Vec<ObjectId>,
}

/// In-memory scene graph implementing [`SceneProvider`].
pub struct MemoryScene {
    nodes: HashMap<ObjectId, SceneNode>,
    /// Creation order; enumeration order follows it.
    order: Vec<ObjectId>,
    /// Type inheritance: type -> base type.
    bases: HashMap<String, String>,
    unavailable: bool,
    calls: Mutex<Vec<ProviderCall>>,
}

impl Default for MemoryScene {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryScene {
    /// Empty scene with a default type table: light and geometry types are
    /// shapes, concrete light types are lights, joints are transforms.
    pub fn new() -> Self {
        let mut scene = Self {
            nodes: HashMap::new(),
            order: Vec::new(),
            bases: HashMap::new(),
            unavailable: false,
            calls: Mutex::new(Vec::new()),
        };
        for shape in ["mesh", "nurbsCurve", "nurbsSurface", "camera", "light"] {
            scene.register_type(shape, "shape");
        }
        for light in [
            "pointLight",
            "spotLight",
            "directionalLight",
            "areaLight",
            "ambientLight",
        ] {
            scene.register_type(light, "light");
        }
        scene.register_type("joint", "transform");
        scene
    }

    /// Declare that `type_name` is a kind of `base`.
    pub fn register_type(&mut self, type_name: &str, base: &str) {
        self.bases.insert(type_name.to_owned(), base.to_owned());
    }

    /// Whether `type_name` is `wanted` or inherits from it.
    #[must_use]
    pub fn is_a(&self, type_name: &str, wanted: &str) -> bool {
        let mut current = Some(type_name);
        // Bounded walk in case of a cyclic table.
        for _ in 0..=self.bases.len() {
            match current {
                Some(t) if t == wanted => return true,
                Some(t) => current = self.bases.get(t).map(String::as_str),
                None => return false,
            }
        }
        false
    }

    /// Create an object under `parent` (or at the root) and return its full path.
    ///
    /// An unknown parent places the object at the root. Spawning an existing
    /// path returns it unchanged.
    pub fn spawn(&mut self, type_name: &str, name: &str, parent: Option<&ObjectId>) -> ObjectId {
        let parent = parent.and_then(|p| self.resolve(p));
        let path = match &parent {
            Some(p) => ObjectId::new(format!("{p}{PATH_SEPARATOR}{name}")),
            None => ObjectId::new(format!("{PATH_SEPARATOR}{name}")),
        };
        if self.nodes.contains_key(&path) {
            return path;
        }

        if let Some(node) = parent.as_ref().and_then(|p| self.nodes.get_mut(p)) {
            node.children.push(path.clone());
        }
        self.nodes.insert(
            path.clone(),
            SceneNode {
                type_name: type_name.to_owned(),
                parent,
                children: Vec::new(),
                attributes: HashMap::new(),
                inputs: Vec::new(),
            },
        );
        self.order.push(path.clone());
        path
    }

    /// Delete an object and its descendants. Returns `false` if unknown.
    pub fn despawn(&mut self, id: &ObjectId) -> bool {
        let Some(id) = self.resolve(id) else {
            return false;
        };
        let mut doomed = vec![id.clone()];
        doomed.extend(self.descendants_of(&id));

        let parent = self.nodes.get(&id).and_then(|n| n.parent.clone());
        if let Some(node) = parent.and_then(|p| self.nodes.get_mut(&p)) {
            node.children.retain(|c| *c != id);
        }
        let doomed: HashSet<ObjectId> = doomed.into_iter().collect();
        for gone in &doomed {
            self.nodes.remove(gone);
        }
        self.order.retain(|o| !doomed.contains(o));
        for node in self.nodes.values_mut() {
            node.inputs.retain(|i| !doomed.contains(i));
        }
        true
    }

    #[must_use]
    pub fn contains(&self, id: &ObjectId) -> bool {
        self.resolve(id).is_some()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Set an attribute. Returns `false` if the object is unknown.
    pub fn set_attribute(&mut self, id: &ObjectId, attribute: &str, value: impl Into<Value>) -> bool {
        let Some(id) = self.resolve(id) else {
            return false;
        };
        match self.nodes.get_mut(&id) {
            Some(node) => {
                node.attributes.insert(attribute.to_owned(), value.into());
                true
            }
            None => false,
        }
    }

    /// Remove an attribute. Returns `false` if it was not set.
    pub fn remove_attribute(&mut self, id: &ObjectId, attribute: &str) -> bool {
        let Some(id) = self.resolve(id) else {
            return false;
        };
        self.nodes
            .get_mut(&id)
            .is_some_and(|node| node.attributes.remove(attribute).is_some())
    }

    /// Record that `downstream` depends on `upstream`.
    pub fn connect(&mut self, upstream: &ObjectId, downstream: &ObjectId) -> bool {
        let (Some(up), Some(down)) = (self.resolve(upstream), self.resolve(downstream)) else {
            return false;
        };
        match self.nodes.get_mut(&down) {
            Some(node) if !node.inputs.contains(&up) => {
                node.inputs.push(up);
                true
            }
            _ => false,
        }
    }

    /// Make every subsequent provider call fail with `Unavailable`.
    pub fn set_unavailable(&mut self, unavailable: bool) {
        self.unavailable = unavailable;
    }

    /// Calls recorded since creation or the last [`reset_calls`](Self::reset_calls).
    pub fn calls(&self) -> Vec<ProviderCall> {
        self.calls.lock().clone()
    }

    /// Number of batched calls recorded (attribute reads excluded).
    pub fn call_count(&self) -> usize {
        self.calls.lock().iter().filter(|c| c.is_batched()).count()
    }

    pub fn reset_calls(&self) {
        self.calls.lock().clear();
    }

    fn record(&self, call: ProviderCall) -> ProviderResult<()> {
        self.calls.lock().push(call);
        if self.unavailable {
            return Err(ProviderError::Unavailable("scene is offline".into()));
        }
        Ok(())
    }

    /// Full path for an identifier that may be a bare leaf name.
    fn resolve(&self, id: &ObjectId) -> Option<ObjectId> {
        if self.nodes.contains_key(id) {
            return Some(id.clone());
        }
        if id.is_full_path() {
            return None;
        }
        self.order
            .iter()
            .find(|path| path.leaf_name() == id.as_str())
            .cloned()
    }

    fn node(&self, id: &ObjectId) -> Option<(ObjectId, &SceneNode)> {
        let path = self.resolve(id)?;
        let node = self.nodes.get(&path)?;
        Some((path, node))
    }

    fn is_shape(&self, id: &ObjectId) -> bool {
        self.nodes
            .get(id)
            .is_some_and(|n| self.is_a(&n.type_name, "shape"))
    }

    fn descendants_of(&self, id: &ObjectId) -> Vec<ObjectId> {
        let mut out = Vec::new();
        let mut stack: Vec<ObjectId> = match self.nodes.get(id) {
            Some(node) => node.children.iter().rev().cloned().collect(),
            None => return out,
        };
        while let Some(next) = stack.pop() {
            if let Some(node) = self.nodes.get(&next) {
                stack.extend(node.children.iter().rev().cloned());
            }
            out.push(next);
        }
        out
    }

    /// Transitive walk over dependency edges, depth first.
    fn walk_dependencies(
        &self,
        ids: &[ObjectId],
        edges: impl Fn(&ObjectId) -> Vec<ObjectId>,
    ) -> Vec<ObjectId> {
        let mut seen: HashSet<ObjectId> = HashSet::new();
        let mut out = Vec::new();
        for id in ids {
            let Some(start) = self.resolve(id) else {
                continue;
            };
            let mut stack: Vec<ObjectId> = edges(&start).into_iter().rev().collect();
            while let Some(next) = stack.pop() {
                if !seen.insert(next.clone()) {
                    continue;
                }
                stack.extend(edges(&next).into_iter().rev());
                out.push(next);
            }
        }
        out
    }
}

fn glob_regex(pattern: &str) -> ProviderResult<Regex> {
    let mut source = String::from("^");
    for c in pattern.chars() {
        match c {
            '*' => source.push_str(".*"),
            '?' => source.push('.'),
            c => source.push_str(&regex::escape(c.encode_utf8(&mut [0; 4]))),
        }
    }
    source.push('$');
    Regex::new(&source).map_err(|e| ProviderError::Unavailable(format!("bad glob {pattern:?}: {e}")))
}

fn display_id(path: &ObjectId, full_path: bool) -> ObjectId {
    if full_path {
        path.clone()
    } else {
        ObjectId::new(path.leaf_name())
    }
}

impl SceneProvider for MemoryScene {
    fn enumerate(&self, types: &TypeSet, pattern: Option<&str>) -> ProviderResult<Vec<ObjectId>> {
        self.record(ProviderCall::Enumerate {
            types: types.clone(),
            pattern: pattern.map(str::to_owned),
        })?;

        let glob = pattern.map(glob_regex).transpose()?;
        let match_full = pattern.is_some_and(|p| p.contains(PATH_SEPARATOR));

        Ok(self
            .order
            .iter()
            .filter(|path| {
                types.is_empty()
                    || self
                        .nodes
                        .get(*path)
                        .is_some_and(|n| types.iter().any(|t| self.is_a(&n.type_name, t)))
            })
            .filter(|path| match &glob {
                Some(re) if match_full => re.is_match(path.as_str()),
                Some(re) => re.is_match(path.leaf_name()),
                None => true,
            })
            .cloned()
            .collect())
    }

    fn relatives(
        &self,
        ids: &[ObjectId],
        kind: RelativeKind,
        full_path: bool,
    ) -> ProviderResult<Vec<ObjectId>> {
        self.record(ProviderCall::Relatives {
            kind,
            batch: ids.len(),
            full_path,
        })?;

        let mut out = Vec::new();
        for id in ids {
            let Some((path, node)) = self.node(id) else {
                continue;
            };
            match kind {
                RelativeKind::Parent => out.extend(node.parent.clone()),
                RelativeKind::Child => out.extend(node.children.iter().cloned()),
                RelativeKind::Shape => out.extend(
                    node.children
                        .iter()
                        .filter(|c| self.is_shape(c))
                        .cloned(),
                ),
                RelativeKind::Leaf => out.extend(
                    node.children
                        .iter()
                        .filter(|c| self.nodes.get(*c).is_some_and(|n| n.children.is_empty()))
                        .cloned(),
                ),
                RelativeKind::Descendant => out.extend(self.descendants_of(&path)),
            }
        }
        Ok(out.iter().map(|p| display_id(p, full_path)).collect())
    }

    fn history(&self, ids: &[ObjectId]) -> ProviderResult<Vec<ObjectId>> {
        self.record(ProviderCall::History { batch: ids.len() })?;
        Ok(self.walk_dependencies(ids, |id| {
            self.nodes
                .get(id)
                .map(|n| n.inputs.clone())
                .unwrap_or_default()
        }))
    }

    fn future(&self, ids: &[ObjectId]) -> ProviderResult<Vec<ObjectId>> {
        self.record(ProviderCall::Future { batch: ids.len() })?;

        let mut downstream: HashMap<&ObjectId, Vec<ObjectId>> = HashMap::new();
        for path in &self.order {
            if let Some(node) = self.nodes.get(path) {
                for input in &node.inputs {
                    downstream.entry(input).or_default().push(path.clone());
                }
            }
        }
        Ok(self.walk_dependencies(ids, |id| downstream.get(id).cloned().unwrap_or_default()))
    }

    fn get_attribute(&self, id: &ObjectId, attribute: &str) -> ProviderResult<Value> {
        self.record(ProviderCall::GetAttribute {
            object: id.clone(),
            attribute: attribute.to_owned(),
        })?;

        self.node(id)
            .and_then(|(_, node)| node.attributes.get(attribute).cloned())
            .ok_or_else(|| ProviderError::AttributeNotFound {
                object: id.clone(),
                attribute: attribute.to_owned(),
            })
    }

    /// Sums `translate` up the ancestor chain.
    fn world_positions(&self, ids: &[ObjectId]) -> ProviderResult<Vec<Vec3>> {
        self.record(ProviderCall::WorldPositions { batch: ids.len() })?;

        ids.iter()
            .map(|id| {
                let Some((path, _)) = self.node(id) else {
                    return Err(ProviderError::AttributeNotFound {
                        object: id.clone(),
                        attribute: WORLD_POSITION_ATTRIBUTE.to_owned(),
                    });
                };
                let mut position = [0.0; 3];
                let mut cursor = Some(path);
                while let Some(current) = cursor {
                    let Some(node) = self.nodes.get(&current) else {
                        break;
                    };
                    if let Some(Value::Vector(t)) = node.attributes.get("translate") {
                        for (axis, offset) in position.iter_mut().zip(t) {
                            *axis += offset;
                        }
                    }
                    cursor = node.parent.clone();
                }
                Ok(position)
            })
            .collect()
    }
}
