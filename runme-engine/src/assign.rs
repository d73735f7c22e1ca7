//! Identity assignment
//!
//! Applies an [`IdentityPlan`] to a document, drawing tokens from an
//! [`IdentityGenerator`] and rejecting any token already present.

use crate::policy::IdentityPlan;
use runme_core::{CellRef, Document, Identity, IdentityCollisionError, IdentityGenerator};
use serde::Serialize;
use std::collections::HashSet;
use tracing::warn;

/// Attempts per identity before a collision is fatal.
pub const MAX_GENERATION_ATTEMPTS: u32 = 2;

/// Identities created by one save.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AssignedIdentities {
    pub document: Option<Identity>,
    pub cells: Vec<(CellRef, Identity)>,
}

impl AssignedIdentities {
    pub fn is_empty(&self) -> bool {
        self.document.is_none() && self.cells.is_empty()
    }

    pub fn len(&self) -> usize {
        usize::from(self.document.is_some()) + self.cells.len()
    }

    /// Identity assigned to `cell` during this save, if any.
    pub fn cell(&self, cell: CellRef) -> Option<Identity> {
        self.cells
            .iter()
            .find(|(cell_ref, _)| *cell_ref == cell)
            .map(|(_, id)| *id)
    }
}

/// Tokens already in use, compared case-insensitively.
#[derive(Debug, Default)]
struct TakenIdentities(HashSet<String>);

impl TakenIdentities {
    fn from_document(document: &Document) -> Self {
        Self(
            document
                .identities()
                .into_iter()
                .map(str::to_ascii_uppercase)
                .collect(),
        )
    }

    /// Records `identity`; false when it was already taken.
    fn claim(&mut self, identity: &Identity) -> bool {
        self.0.insert(identity.to_string().to_ascii_uppercase())
    }
}

/// Adds every identity in `plan` to `document`.
///
/// Each new token is checked against the identities already in the document
/// and those assigned earlier in the same call. A colliding token is
/// regenerated once; a second collision fails the whole assignment.
///
/// # Errors
/// Returns [`IdentityCollisionError`] when the generator repeats itself. The
/// document may then be partially updated and must be discarded.
pub fn apply_plan<G>(
    document: &mut Document,
    plan: &IdentityPlan,
    generator: &G,
) -> Result<AssignedIdentities, IdentityCollisionError>
where
    G: IdentityGenerator + ?Sized,
{
    let mut taken = TakenIdentities::from_document(document);
    let mut assigned = AssignedIdentities::default();

    if plan.needs_document_identity {
        let identity = fresh_identity(generator, &mut taken)?;
        if document.assign_document_identity(&identity) {
            assigned.document = Some(identity);
        }
    }

    for &cell in &plan.cells {
        let identity = fresh_identity(generator, &mut taken)?;
        if document.assign_cell_identity(cell, &identity) {
            assigned.cells.push((cell, identity));
        }
    }

    Ok(assigned)
}

fn fresh_identity<G>(
    generator: &G,
    taken: &mut TakenIdentities,
) -> Result<Identity, IdentityCollisionError>
where
    G: IdentityGenerator + ?Sized,
{
    let mut last = None;
    for attempt in 1..=MAX_GENERATION_ATTEMPTS {
        let identity = generator.next();
        if taken.claim(&identity) {
            return Ok(identity);
        }
        warn!(identity = %identity, attempt, "generated identity already in use");
        last = Some(identity);
    }

    Err(IdentityCollisionError {
        identity: last.map(|id| id.to_string()).unwrap_or_default(),
        attempts: MAX_GENERATION_ATTEMPTS,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::evaluate;
    use runme_core::LifecycleSetting;
    use runme_markdown::parse;
    use runme_test_utils::{
        fixtures, identity, FixedGenerator, ScriptedGenerator, SequenceGenerator,
    };

    #[test]
    fn test_assigns_document_and_cells() {
        let mut doc = parse(fixtures::SHEBANG).unwrap();
        let plan = evaluate(&doc, LifecycleSetting::All);
        let generator = SequenceGenerator::new();

        let assigned = apply_plan(&mut doc, &plan, &generator).unwrap();
        assert_eq!(assigned.document, Some(generator.nth(1)));
        assert_eq!(assigned.cell(CellRef(0)), Some(generator.nth(2)));
        assert_eq!(assigned.len(), 2);
        assert_eq!(doc.document_identity(), Some(generator.nth(1).to_string().as_str()));
    }

    #[test]
    fn test_empty_plan_draws_nothing() {
        let mut doc = parse(fixtures::FULLY_POPULATED).unwrap();
        let generator = SequenceGenerator::new();
        let assigned = apply_plan(&mut doc, &IdentityPlan::default(), &generator).unwrap();
        assert!(assigned.is_empty());
        assert_eq!(generator.issued(), 0);
    }

    #[test]
    fn test_collision_with_existing_identity_regenerates_once() {
        let mut doc = parse(fixtures::EXISTENT_DOC_ID).unwrap();
        let plan = evaluate(&doc, LifecycleSetting::Cell);
        let existing = identity(fixtures::EXISTENT_DOC_IDENTITY);
        let fresh = identity("01HFA08N6F66WSG09RR9XEP0T6");
        let generator = ScriptedGenerator::new([existing, fresh]);

        let assigned = apply_plan(&mut doc, &plan, &generator).unwrap();
        assert_eq!(assigned.cell(CellRef(0)), Some(fresh));
    }

    #[test]
    fn test_collision_is_case_insensitive() {
        let mut doc = parse("```sh {\"id\":\"01her3ga0rqkjetkk5x5pprtb4\"}\na\n```\n\n```sh\nb\n```\n").unwrap();
        let plan = evaluate(&doc, LifecycleSetting::Cell);
        let generator = FixedGenerator(identity(fixtures::EXISTENT_CELL_IDENTITY));
        assert!(apply_plan(&mut doc, &plan, &generator).is_err());
    }

    #[test]
    fn test_repeated_collision_is_fatal() {
        let mut doc = parse(fixtures::EXISTENT_CELL_ID).unwrap();
        let plan = evaluate(&doc, LifecycleSetting::Doc);
        let generator = FixedGenerator(identity(fixtures::EXISTENT_CELL_IDENTITY));

        let err = apply_plan(&mut doc, &plan, &generator).unwrap_err();
        assert_eq!(err.attempts, MAX_GENERATION_ATTEMPTS);
        assert_eq!(err.identity, fixtures::EXISTENT_CELL_IDENTITY);
    }

    #[test]
    fn test_identities_assigned_in_same_save_are_checked() {
        let mut doc = parse(fixtures::SHEBANG).unwrap();
        let plan = evaluate(&doc, LifecycleSetting::All);
        // Document and cell would both get the same token.
        let generator = FixedGenerator(identity("01HFA08N6F66WSG09RR9XEP0T6"));
        assert!(apply_plan(&mut doc, &plan, &generator).is_err());
    }
}
