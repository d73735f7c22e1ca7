//! Identity policy evaluation
//!
//! Decides which entities of a parsed document still lack an identity that
//! the active [`LifecycleSetting`] requires. Pure: reads the document, never
//! mutates it.

use runme_core::{CellRef, Document, LifecycleSetting};
use serde::Serialize;
use std::collections::BTreeSet;

/// Identities a save has to create.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IdentityPlan {
    pub needs_document_identity: bool,
    /// Cells without an `id` attribute, in document order.
    pub cells: BTreeSet<CellRef>,
}

impl IdentityPlan {
    /// Nothing to create.
    pub fn is_empty(&self) -> bool {
        !self.needs_document_identity && self.cells.is_empty()
    }

    /// Number of identities the plan creates.
    pub fn len(&self) -> usize {
        usize::from(self.needs_document_identity) + self.cells.len()
    }
}

/// Evaluates the lifecycle policy against a document.
///
/// A document identity is needed when the setting covers documents, none is
/// present, and the document is not blank. A cell needs an identity when the
/// setting covers cells and the cell has no `id` attribute of any value.
pub fn evaluate(document: &Document, setting: LifecycleSetting) -> IdentityPlan {
    let needs_document_identity = setting.creates_document_identity()
        && document.document_identity().is_none()
        && !document.is_blank();

    let cells = if setting.creates_cell_identity() {
        document
            .cells()
            .filter(|(_, cell)| !cell.has_identity())
            .map(|(cell_ref, _)| cell_ref)
            .collect()
    } else {
        BTreeSet::new()
    };

    IdentityPlan {
        needs_document_identity,
        cells,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use runme_markdown::parse;
    use runme_test_utils::fixtures;

    #[test]
    fn test_none_creates_nothing() {
        for fixture in [fixtures::SHEBANG, fixtures::EXISTENT_CELL_ID, fixtures::EMPTY] {
            let doc = parse(fixture).unwrap();
            assert!(evaluate(&doc, LifecycleSetting::None).is_empty());
        }
    }

    #[test]
    fn test_blank_document_needs_nothing() {
        for setting in LifecycleSetting::VALUES {
            assert!(evaluate(&parse("").unwrap(), setting).is_empty());
            assert!(evaluate(&parse("\n  \n").unwrap(), setting).is_empty());
        }
    }

    #[test]
    fn test_doc_setting_ignores_cells() {
        let doc = parse(fixtures::SHEBANG).unwrap();
        let plan = evaluate(&doc, LifecycleSetting::Doc);
        assert!(plan.needs_document_identity);
        assert!(plan.cells.is_empty());
        assert_eq!(plan.len(), 1);
    }

    #[test]
    fn test_cell_setting_ignores_document() {
        let doc = parse(fixtures::SHEBANG).unwrap();
        let plan = evaluate(&doc, LifecycleSetting::Cell);
        assert!(!plan.needs_document_identity);
        assert_eq!(plan.cells.iter().copied().collect::<Vec<_>>(), vec![CellRef(0)]);
    }

    #[test]
    fn test_existing_identities_are_satisfied() {
        let doc = parse(fixtures::FULLY_POPULATED).unwrap();
        for setting in LifecycleSetting::VALUES {
            assert!(evaluate(&doc, setting).is_empty(), "{setting} should create nothing");
        }
    }

    #[test]
    fn test_all_picks_only_missing_cells() {
        let text = "```sh {\"id\":\"01HER3GA0RQKJETKK5X5PPRTB4\"}\na\n```\n\n```sh\nb\n```\n";
        let plan = evaluate(&parse(text).unwrap(), LifecycleSetting::All);
        assert!(plan.needs_document_identity);
        assert_eq!(plan.cells.iter().copied().collect::<Vec<_>>(), vec![CellRef(1)]);
    }

    #[test]
    fn test_evaluation_is_deterministic() {
        let doc = parse(fixtures::EXISTENT_DOC_ID).unwrap();
        assert_eq!(
            evaluate(&doc, LifecycleSetting::All),
            evaluate(&doc, LifecycleSetting::All)
        );
    }
}
