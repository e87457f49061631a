//! Variable binding environments.
//!
//! A [`Scope`] is a chain of frames, each mapping parameter identities to
//! shared value cells. Lambdas capture the scope they were evaluated in by
//! reference: an inner delegate reads and writes the same cells as the code
//! around it.

use std::cell::RefCell;
use std::rc::Rc;

use exprtree_core::{ObjectData, Value};
use rustc_hash::FxHashMap;

use crate::node::ParamId;

/// One frame in the binding chain.
pub struct Scope {
    parent: Option<Rc<Scope>>,
    slots: RefCell<FxHashMap<ParamId, Rc<RefCell<Value>>>>,
}

impl Scope {
    pub fn root() -> Rc<Scope> {
        Rc::new(Scope { parent: None, slots: RefCell::new(FxHashMap::default()) })
    }

    pub fn child(self: &Rc<Self>) -> Rc<Scope> {
        Rc::new(Scope {
            parent: Some(self.clone()),
            slots: RefCell::new(FxHashMap::default()),
        })
    }

    /// Bind a fresh cell for `id` in this frame, shadowing any outer binding.
    pub fn declare(&self, id: ParamId, value: Value) -> Rc<RefCell<Value>> {
        let cell = Rc::new(RefCell::new(value));
        self.slots.borrow_mut().insert(id, cell.clone());
        cell
    }

    /// The cell bound to `id`, searching outward through parent frames.
    pub fn cell(&self, id: ParamId) -> Option<Rc<RefCell<Value>>> {
        if let Some(cell) = self.slots.borrow().get(&id) {
            return Some(cell.clone());
        }
        self.parent.as_ref().and_then(|p| p.cell(id))
    }

    pub fn get(&self, id: ParamId) -> Option<Value> {
        self.cell(id).map(|c| c.borrow().clone())
    }
}

/// Where a by-reference argument writes back after the call returns.
pub enum Sink {
    /// A variable cell.
    Cell(Rc<RefCell<Value>>),
    /// A field of an object instance.
    Field { obj: Rc<RefCell<ObjectData>>, name: String },
}

impl Sink {
    pub fn store(&self, value: Value) {
        match self {
            Sink::Cell(cell) => *cell.borrow_mut() = value,
            Sink::Field { obj, name } => {
                obj.borrow_mut().fields.insert(name.clone(), value);
            }
        }
    }
}
