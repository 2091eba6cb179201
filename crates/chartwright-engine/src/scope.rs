//! Scope context: `.`, `$` and `$name` bindings
//!
//! A [`Scope`] is immutable. `narrow` and `bind` return new scopes that share
//! the parent's bindings through an `Rc` chain, so sibling branches never see
//! each other's variables.
//!
//! A binding's value lives in a cell. `$x = v` writes the cell of the nearest
//! `$x`, so the new value is seen after the assigning block ends.

use chartwright_core::ValueNode;
use std::cell::RefCell;
use std::ops::Deref;
use std::rc::Rc;

/// A value seen by the renderer
///
/// Values read from the render root are borrowed. Values computed by
/// functions or literals are reference counted so scopes can share them.
#[derive(Debug, Clone)]
pub enum Slot<'a> {
    Borrowed(&'a ValueNode),
    Shared(Rc<ValueNode>),
}

impl<'a> Slot<'a> {
    pub fn owned(value: ValueNode) -> Self {
        Slot::Shared(Rc::new(value))
    }

    pub fn into_owned(self) -> ValueNode {
        match self {
            Slot::Borrowed(value) => value.clone(),
            Slot::Shared(rc) => Rc::try_unwrap(rc).unwrap_or_else(|rc| (*rc).clone()),
        }
    }
}

impl Deref for Slot<'_> {
    type Target = ValueNode;

    fn deref(&self) -> &ValueNode {
        match self {
            Slot::Borrowed(value) => value,
            Slot::Shared(rc) => rc,
        }
    }
}

#[derive(Debug)]
struct Binding<'a> {
    name: String,
    value: RefCell<Slot<'a>>,
    next: Option<Rc<Binding<'a>>>,
}

#[derive(Debug, Clone)]
pub struct Scope<'a> {
    current: Slot<'a>,
    root: &'a ValueNode,
    vars: Option<Rc<Binding<'a>>>,
}

impl<'a> Scope<'a> {
    /// Top-level scope: `.` and `$` are both the root
    pub fn new(root: &'a ValueNode) -> Self {
        Self {
            current: Slot::Borrowed(root),
            root,
            vars: None,
        }
    }

    /// Same root and bindings, new `.`
    pub fn narrow(&self, value: Slot<'a>) -> Self {
        Self {
            current: value,
            root: self.root,
            vars: self.vars.clone(),
        }
    }

    /// Same `.`, with `$name` bound (shadowing any outer binding)
    pub fn bind(&self, name: &str, value: Slot<'a>) -> Self {
        Self {
            current: self.current.clone(),
            root: self.root,
            vars: Some(Rc::new(Binding {
                name: name.to_string(),
                value: RefCell::new(value),
                next: self.vars.clone(),
            })),
        }
    }

    /// The top-level scope, whatever the nesting depth
    pub fn resolve_root(&self) -> Self {
        Self::new(self.root)
    }

    /// Scope for a named template body: new `.`, no caller variables
    pub fn enter_fragment(&self, value: Slot<'a>) -> Self {
        Self {
            current: value,
            root: self.root,
            vars: None,
        }
    }

    pub fn dot(&self) -> &Slot<'a> {
        &self.current
    }

    pub fn root(&self) -> &'a ValueNode {
        self.root
    }

    /// Current value of the nearest `$name`
    pub fn lookup(&self, name: &str) -> Option<Slot<'a>> {
        self.binding(name).map(|b| b.value.borrow().clone())
    }

    /// Overwrite the nearest `$name`; `false` if nothing is bound
    pub fn assign(&self, name: &str, value: Slot<'a>) -> bool {
        match self.binding(name) {
            Some(b) => {
                *b.value.borrow_mut() = value;
                true
            }
            None => false,
        }
    }

    fn binding(&self, name: &str) -> Option<&Binding<'a>> {
        let mut binding = self.vars.as_deref();
        while let Some(b) = binding {
            if b.name == name {
                return Some(b);
            }
            binding = b.next.as_deref();
        }
        None
    }
}
