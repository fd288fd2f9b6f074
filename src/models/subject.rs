// src/models/subject.rs

use serde::Serialize;

/// A named subdivision of a subject used to classify questions.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct Subcategory {
    pub id: &'static str,
    pub name: &'static str,
}

/// Immutable reference data: the subject catalog is hard-coded, not persisted.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct Subject {
    pub id: &'static str,
    pub name: &'static str,
    pub subcategories: &'static [Subcategory],
}

pub static SUBJECTS: &[Subject] = &[
    Subject {
        id: "math",
        name: "Matemática",
        subcategories: &[
            Subcategory { id: "algebra", name: "Álgebra" },
            Subcategory { id: "trigonometry", name: "Trigonometría" },
            Subcategory { id: "geometry", name: "Geometría" },
            Subcategory { id: "calculus", name: "Cálculo" },
        ],
    },
    Subject {
        id: "communication",
        name: "Comunicación",
        subcategories: &[
            Subcategory { id: "grammar", name: "Gramática" },
            Subcategory { id: "literature", name: "Literatura" },
            Subcategory { id: "oral", name: "Comunicación Oral" },
            Subcategory { id: "written", name: "Comunicación Escrita" },
        ],
    },
];

pub fn subject_info(subject_id: &str) -> Option<&'static Subject> {
    SUBJECTS.iter().find(|s| s.id == subject_id)
}

/// Looks up a subcategory within its subject, enforcing that the two are
/// compatible. A subcategory id from a different subject yields None.
pub fn subcategory_info(subject_id: &str, subcategory_id: &str) -> Option<&'static Subcategory> {
    subject_info(subject_id)?
        .subcategories
        .iter()
        .find(|s| s.id == subcategory_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_subject_resolves() {
        let subject = subject_info("math").unwrap();
        assert_eq!(subject.name, "Matemática");
        assert_eq!(subject.subcategories.len(), 4);
    }

    #[test]
    fn subcategory_must_belong_to_subject() {
        assert!(subcategory_info("math", "algebra").is_some());
        assert!(subcategory_info("communication", "algebra").is_none());
        assert!(subcategory_info("history", "algebra").is_none());
    }
}
