//! Casting type-erased pointers along registered base/derived relationships.
//!
//! A front end that transcribes objects through base references only has a
//! base pointer and the runtime [`TypeId`] of the most derived object. The
//! registry records, for each derived type, how to reach each of its direct
//! bases, and composes those steps to cast between any two related types.
//!
//! Classes are nodes in an arena and links are edges addressed by index.
//! Path search always runs from the derived node towards its bases, since a
//! type has few direct bases but possibly many derived types. A cast with
//! more than one path is rejected as ambiguous.
//!
//! ```
//! use scribe::{VoidCastRegistry, register_base};
//!
//! struct Shape {
//!     id: u32,
//! }
//!
//! struct Circle {
//!     radius: f32,
//!     shape: Shape,
//! }
//!
//! let mut registry = VoidCastRegistry::new();
//! register_base!(registry, Circle, shape: Shape);
//!
//! let circle = Circle { radius: 1.0, shape: Shape { id: 7 } };
//! let shape: &Shape = registry.up_cast_ref(&circle).unwrap().unwrap();
//! assert_eq!(shape.id, 7);
//! ```

use std::any::{Any, TypeId, type_name};
use std::fmt;
use std::ops::Deref;
use std::ptr::NonNull;
use std::sync::Arc;

use rustc_hash::FxHashMap;
use tracing::{debug, trace};

use crate::error::CastError;

/// Address adjustment applied when crossing one link. It only computes an
/// address and never dereferences, so it is sound for any input pointer.
type Adjust = Box<dyn Fn(*mut ()) -> *mut () + Send + Sync>;

struct ClassNode {
    name: &'static str,
    /// Indices into `links` of this class's direct bases.
    base_links: Vec<usize>,
}

struct ClassLink {
    derived: usize,
    base: usize,
    upcast: Adjust,
    downcast: Adjust,
}

/// Registry of base/derived relationships.
#[derive(Default)]
pub struct VoidCastRegistry {
    nodes: Vec<ClassNode>,
    links: Vec<ClassLink>,
    node_ids: FxHashMap<TypeId, usize>,
}

impl fmt::Debug for VoidCastRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let links: Vec<_> = self
            .links
            .iter()
            .map(|link| (self.nodes[link.derived].name, self.nodes[link.base].name))
            .collect();
        f.debug_struct("VoidCastRegistry")
            .field("links", &links)
            .finish()
    }
}

impl VoidCastRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of registered classes.
    pub fn num_classes(&self) -> usize {
        self.nodes.len()
    }

    /// Returns the number of registered base/derived links.
    pub fn num_links(&self) -> usize {
        self.links.len()
    }

    /// Returns true if `T` takes part in any registered link.
    pub fn is_registered<T: 'static>(&self) -> bool {
        self.node_ids.contains_key(&TypeId::of::<T>())
    }

    /// Registers `B` as a direct base of `D` stored `offset` bytes into `D`.
    ///
    /// Registering the same pair twice has no effect.
    ///
    /// # Safety
    ///
    /// Every `D` must contain a valid `B` at byte offset `offset`. Prefer the
    /// [`register_base!`](crate::register_base) macro, which computes the
    /// offset from a field.
    pub unsafe fn register_offset<D: 'static, B: 'static>(&mut self, offset: usize) {
        // SAFETY: forwarded from the caller; `B` lives at `offset` in `D`.
        unsafe {
            self.register_with::<D, B>(
                move |ptr| ptr.wrapping_byte_add(offset),
                move |ptr| ptr.wrapping_byte_sub(offset),
            );
        }
    }

    /// Registers `B` as a direct base of `D` with explicit adjustments.
    ///
    /// Registering the same pair twice has no effect.
    ///
    /// # Safety
    ///
    /// `upcast` must map a pointer to a live `D` to a pointer to its `B`, and
    /// `downcast` must map a pointer to the `B` inside a live `D` back to the
    /// `D`. Both are applied to arbitrary caller pointers by [`up_cast`] and
    /// [`down_cast`], so they must only compute addresses (e.g. with
    /// wrapping arithmetic) and never read through the pointer.
    ///
    /// [`up_cast`]: Self::up_cast
    /// [`down_cast`]: Self::down_cast
    pub unsafe fn register_with<D: 'static, B: 'static>(
        &mut self,
        upcast: impl Fn(*mut ()) -> *mut () + Send + Sync + 'static,
        downcast: impl Fn(*mut ()) -> *mut () + Send + Sync + 'static,
    ) {
        let derived = self.node(TypeId::of::<D>(), type_name::<D>());
        let base = self.node(TypeId::of::<B>(), type_name::<B>());

        let duplicate = self.nodes[derived]
            .base_links
            .iter()
            .any(|&link| self.links[link].base == base);
        if duplicate {
            debug!(derived = type_name::<D>(), base = type_name::<B>(), "link already registered");
            return;
        }

        let index = self.links.len();
        self.links.push(ClassLink {
            derived,
            base,
            upcast: Box::new(upcast),
            downcast: Box::new(downcast),
        });
        self.nodes[derived].base_links.push(index);
        debug!(derived = type_name::<D>(), base = type_name::<B>(), "registered class link");
    }

    fn node(&mut self, type_id: TypeId, name: &'static str) -> usize {
        if let Some(&index) = self.node_ids.get(&type_id) {
            return index;
        }
        let index = self.nodes.len();
        self.nodes.push(ClassNode {
            name,
            base_links: Vec::new(),
        });
        self.node_ids.insert(type_id, index);
        index
    }

    /// Finds the chain of links from `derived` to `base`.
    ///
    /// The search does not stop at the first match: every path is explored
    /// so that a second route to `base` is reported as ambiguous.
    fn find_path(&self, derived: usize, base: usize) -> Result<Option<Vec<usize>>, CastError> {
        let mut found: Option<Vec<usize>> = None;
        // (node, position of the next base link to try)
        let mut stack = vec![(derived, 0usize)];
        let mut path: Vec<usize> = Vec::new();

        while let Some(frame) = stack.last_mut() {
            let (node, cursor) = *frame;
            let Some(&link) = self.nodes[node].base_links.get(cursor) else {
                stack.pop();
                path.pop();
                continue;
            };
            frame.1 += 1;

            let next = self.links[link].base;
            if stack.iter().any(|&(on_path, _)| on_path == next) {
                continue;
            }
            path.push(link);
            if next == base {
                if found.is_some() {
                    return Err(CastError::Ambiguous {
                        derived: self.nodes[derived].name,
                        base: self.nodes[base].name,
                    });
                }
                found = Some(path.clone());
                path.pop();
            } else {
                stack.push((next, 0));
            }
        }

        trace!(
            derived = self.nodes[derived].name,
            base = self.nodes[base].name,
            steps = found.as_ref().map(Vec::len),
            "resolved cast path"
        );
        Ok(found)
    }

    fn resolve(&self, derived: TypeId, base: TypeId) -> Result<Option<Vec<usize>>, CastError> {
        match (self.node_ids.get(&derived), self.node_ids.get(&base)) {
            (Some(&derived), Some(&base)) => self.find_path(derived, base),
            _ => Ok(None),
        }
    }

    /// Casts a pointer to a `derived` object to a pointer to its `base`.
    ///
    /// Returns the pointer unchanged when the types are identical and `None`
    /// when no path exists. Only the address is adjusted: the result may be
    /// dereferenced only if `ptr` points to a live object of type `derived`.
    /// An adjustment that wraps to null also yields `None`.
    pub fn up_cast(
        &self,
        derived: TypeId,
        base: TypeId,
        ptr: NonNull<()>,
    ) -> Result<Option<NonNull<()>>, CastError> {
        if derived == base {
            return Ok(Some(ptr));
        }
        Ok(self.resolve(derived, base)?.and_then(|path| {
            let adjusted = path
                .iter()
                .fold(ptr.as_ptr(), |ptr, &link| (self.links[link].upcast)(ptr));
            NonNull::new(adjusted)
        }))
    }

    /// Casts a pointer to a `base` subobject back to its `derived` object.
    ///
    /// The path is searched in the derived-to-base direction and applied in
    /// reverse. As with [`up_cast`](Self::up_cast), only the address is
    /// computed.
    pub fn down_cast(
        &self,
        derived: TypeId,
        base: TypeId,
        ptr: NonNull<()>,
    ) -> Result<Option<NonNull<()>>, CastError> {
        if derived == base {
            return Ok(Some(ptr));
        }
        Ok(self.resolve(derived, base)?.and_then(|path| {
            let adjusted = path
                .iter()
                .rev()
                .fold(ptr.as_ptr(), |ptr, &link| (self.links[link].downcast)(ptr));
            NonNull::new(adjusted)
        }))
    }

    /// Up-casts a reference.
    pub fn up_cast_ref<'a, D: 'static, B: 'static>(
        &self,
        derived: &'a D,
    ) -> Result<Option<&'a B>, CastError> {
        let ptr = NonNull::from(derived).cast::<()>();
        let cast = self.up_cast(TypeId::of::<D>(), TypeId::of::<B>(), ptr)?;
        // SAFETY: registered links map a live `D` to the `B` it contains,
        // which shares the lifetime of `derived`.
        Ok(cast.map(|ptr| unsafe { ptr.cast::<B>().as_ref() }))
    }

    /// Down-casts a reference.
    ///
    /// # Safety
    ///
    /// `base` must be the `B` subobject of a live `D` that outlives `'a`.
    pub unsafe fn down_cast_ref<'a, D: 'static, B: 'static>(
        &self,
        base: &'a B,
    ) -> Result<Option<&'a D>, CastError> {
        let ptr = NonNull::from(base).cast::<()>();
        let cast = self.down_cast(TypeId::of::<D>(), TypeId::of::<B>(), ptr)?;
        // SAFETY: guaranteed by the caller.
        Ok(cast.map(|ptr| unsafe { ptr.cast::<D>().as_ref() }))
    }

    /// Up-casts shared ownership of a `D` to a view of its `B`.
    ///
    /// The returned handle keeps the original allocation alive.
    pub fn up_cast_arc<D: Any + Send + Sync, B: 'static>(
        &self,
        derived: Arc<D>,
    ) -> Result<Option<SharedCast<B>>, CastError> {
        let ptr = NonNull::from(&*derived).cast::<()>();
        let cast = self.up_cast(TypeId::of::<D>(), TypeId::of::<B>(), ptr)?;
        Ok(cast.map(|ptr| SharedCast {
            owner: derived,
            ptr: ptr.cast::<B>(),
        }))
    }

    /// Down-casts a shared view of a `B` to a view of the `D` containing it.
    ///
    /// # Safety
    ///
    /// The `B` viewed by `base` must be the `B` subobject of a `D` inside
    /// the allocation owned by `base`.
    pub unsafe fn down_cast_shared<D: 'static, B: 'static>(
        &self,
        base: &SharedCast<B>,
    ) -> Result<Option<SharedCast<D>>, CastError> {
        let cast = self.down_cast(TypeId::of::<D>(), TypeId::of::<B>(), base.ptr.cast::<()>())?;
        Ok(cast.map(|ptr| SharedCast {
            owner: Arc::clone(&base.owner),
            ptr: ptr.cast::<D>(),
        }))
    }
}

/// Shared view of a `T` inside an `Arc`-owned object.
///
/// Like an aliasing `shared_ptr`: dereferences to the cast target while
/// holding a strong reference to the original allocation.
pub struct SharedCast<T> {
    owner: Arc<dyn Any + Send + Sync>,
    ptr: NonNull<T>,
}

impl<T> SharedCast<T> {
    /// Returns the allocation this view keeps alive.
    pub fn owner(&self) -> &Arc<dyn Any + Send + Sync> {
        &self.owner
    }

    /// Returns the address of the viewed `T`.
    pub fn as_ptr(&self) -> *const T {
        self.ptr.as_ptr()
    }
}

impl<T> Clone for SharedCast<T> {
    fn clone(&self) -> Self {
        Self {
            owner: Arc::clone(&self.owner),
            ptr: self.ptr,
        }
    }
}

impl<T> Deref for SharedCast<T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: `ptr` points into the allocation held by `owner`.
        unsafe { self.ptr.as_ref() }
    }
}

impl<T: fmt::Debug> fmt::Debug for SharedCast<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&**self, f)
    }
}

/// Registers a struct field as the base of its containing type.
///
/// `register_base!(registry, Derived, field: Base)` records that every
/// `Derived` holds its `Base` in `field`. The field type is checked at
/// compile time.
#[macro_export]
macro_rules! register_base {
    ($registry:expr, $derived:ty, $field:ident : $base:ty) => {{
        #[allow(dead_code)]
        fn field_has_base_type(derived: &$derived) -> &$base {
            &derived.$field
        }
        // SAFETY: `offset_of!` yields the position of a `$base` field in `$derived`.
        unsafe {
            $registry.register_offset::<$derived, $base>(::core::mem::offset_of!($derived, $field))
        }
    }};
}
