//! A lazy, dependency-ordered field evaluator.
//!
//! Every structure in the property store format is described by a [`Layout`]: a static,
//! ordered table of named fields, each with the names of the fields it depends on and a
//! function that reads it from a [`ByteCursor`]. A [`LazyStructure`] binds a layout to one
//! window of input and evaluates fields on demand:
//!
//! - reading a field first evaluates its dependencies (recursively), then the field itself;
//! - every evaluator runs at most once, its result is memoized in a slot indexed by
//!   declaration order;
//! - after each evaluation, [`Layout::should_continue`] decides whether the fields declared
//!   after it are evaluated at all. A `false` makes the structure *short*: a valid partial parse
//!   (e.g. a zero sized terminator record).
//!
//! Errors raised by an evaluator are tagged with the structure, the field and the offset the
//! field started at.
//!
//! The engine knows nothing about the property store format itself.

use crate::err::{DeserializationError, DeserializationResult};
use crate::utils::{ByteCursor, SubView};
use crate::wps_parser::ParserSettings;

use log::{debug, trace};

pub(crate) type Evaluator<V> =
    fn(&mut ByteCursor<'_>, &FieldSet<V>, &ParserSettings) -> DeserializationResult<V>;

pub(crate) struct FieldDecl<V: 'static> {
    pub(crate) name: &'static str,
    pub(crate) deps: &'static [&'static str],
    pub(crate) evaluate: Evaluator<V>,
}

pub(crate) trait Layout {
    /// One variant per field, shared by every field of the layout.
    type Value: 'static;

    const STRUCTURE: &'static str;
    const FIELDS: &'static [FieldDecl<Self::Value>];

    /// Called after every field evaluation with everything evaluated so far.
    fn should_continue(_field: &'static str, _fields: &FieldSet<Self::Value>) -> bool {
        true
    }
}

/// Memoized field results, indexed by declaration order.
pub(crate) struct FieldSet<V: 'static> {
    structure: &'static str,
    decls: &'static [FieldDecl<V>],
    slots: Vec<Option<V>>,
}

impl<V: 'static> FieldSet<V> {
    fn new(structure: &'static str, decls: &'static [FieldDecl<V>]) -> Self {
        FieldSet {
            structure,
            decls,
            slots: decls.iter().map(|_| None).collect(),
        }
    }

    fn index_of(&self, name: &str) -> Option<usize> {
        self.decls.iter().position(|decl| decl.name == name)
    }

    pub(crate) fn get(&self, name: &str) -> Option<&V> {
        self.index_of(name).and_then(|i| self.slots[i].as_ref())
    }

    /// Like [`FieldSet::get`], for evaluators reading one of their declared dependencies.
    pub(crate) fn require(&self, name: &'static str) -> DeserializationResult<&V> {
        self.get(name)
            .ok_or(DeserializationError::FieldNotEvaluated {
                structure: self.structure,
                field: name,
            })
    }

    pub(crate) fn take(&mut self, name: &str) -> Option<V> {
        let index = self.index_of(name)?;
        self.slots[index].take()
    }
}

/// The outcome of evaluating every field of a [`LazyStructure`].
pub(crate) struct ParsedFields<V: 'static> {
    pub(crate) fields: FieldSet<V>,
    /// The field after which evaluation stopped, if the structure is short.
    pub(crate) short_after: Option<&'static str>,
    /// Relative position of the cursor after the last evaluated field.
    pub(crate) end: usize,
}

pub(crate) struct LazyStructure<'a, 's, L: Layout> {
    cursor: ByteCursor<'a>,
    settings: &'s ParserSettings,
    fields: FieldSet<L::Value>,
    in_progress: Vec<bool>,
    short_after: Option<usize>,
}

impl<'a, 's, L: Layout> LazyStructure<'a, 's, L> {
    pub(crate) fn new(view: SubView<'a>, settings: &'s ParserSettings) -> Self {
        LazyStructure {
            cursor: view.cursor(),
            settings,
            fields: FieldSet::new(L::STRUCTURE, L::FIELDS),
            in_progress: vec![false; L::FIELDS.len()],
            short_after: None,
        }
    }

    /// Evaluate every field in declaration order.
    pub(crate) fn parse(mut self) -> DeserializationResult<ParsedFields<L::Value>> {
        for index in 0..L::FIELDS.len() {
            if !self.evaluate(index)? {
                break;
            }
        }

        Ok(ParsedFields {
            short_after: self.short_after.map(|i| L::FIELDS[i].name),
            end: self.cursor.pos(),
            fields: self.fields,
        })
    }

    fn is_cut_off(&self, index: usize) -> bool {
        self.short_after.is_some_and(|short| index > short)
    }

    /// Returns whether the field at `index` holds a value afterwards.
    fn evaluate(&mut self, index: usize) -> DeserializationResult<bool> {
        if self.fields.slots[index].is_some() {
            return Ok(true);
        }
        if self.is_cut_off(index) {
            return Ok(false);
        }

        let decl = &L::FIELDS[index];
        if self.in_progress[index] {
            return Err(DeserializationError::DependencyCycle {
                structure: L::STRUCTURE,
                field: decl.name,
            });
        }

        self.in_progress[index] = true;
        let deps_ready = self.evaluate_deps(decl);
        self.in_progress[index] = false;

        // A dependency may have made the structure short.
        if !deps_ready? || self.is_cut_off(index) {
            return Ok(false);
        }

        let start = self.cursor.position();
        trace!(
            "Offset `0x{offset:08x} ({offset})`: evaluating {structure}.{field}",
            offset = start,
            structure = L::STRUCTURE,
            field = decl.name
        );

        let value = (decl.evaluate)(&mut self.cursor, &self.fields, self.settings).map_err(
            |source| DeserializationError::FailedToDecodeField {
                structure: L::STRUCTURE,
                field: decl.name,
                offset: start,
                source: Box::new(source),
            },
        )?;
        self.fields.slots[index] = Some(value);

        if !L::should_continue(decl.name, &self.fields) {
            debug!(
                "{} at offset {} is short after `{}`",
                L::STRUCTURE,
                start,
                decl.name
            );
            self.short_after = Some(index);
        }

        Ok(true)
    }

    fn evaluate_deps(&mut self, decl: &'static FieldDecl<L::Value>) -> DeserializationResult<bool> {
        for &dep in decl.deps {
            let dep_index =
                self.fields
                    .index_of(dep)
                    .ok_or(DeserializationError::UndeclaredDependency {
                        structure: L::STRUCTURE,
                        field: decl.name,
                        dependency: dep,
                    })?;
            if !self.evaluate(dep_index)? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}
