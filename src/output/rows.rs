//! Enrollment to row mapping.

use crate::output::{CellValue, Row};
use crate::Enrollment;

/// Column order of the enrollment table.
pub const ENROLLMENT_HEADERS: [&str; 13] = [
    "idMatricula",
    "aluno",
    "ra",
    "curso",
    "turma",
    "status",
    "periodoLetivo",
    "unidadeFisica",
    "organizacao",
    "idOrg",
    "dataMatricula",
    "dataAtivacao",
    "dataCadastro",
];

/// Header row as owned strings.
pub fn enrollment_headers() -> Vec<String> {
    ENROLLMENT_HEADERS.iter().map(|h| h.to_string()).collect()
}

/// Map one enrollment to cells in [`ENROLLMENT_HEADERS`] order.
pub fn enrollment_row(enrollment: &Enrollment) -> Row {
    vec![
        CellValue::Integer(enrollment.id),
        enrollment.student.clone().into(),
        enrollment.ra.clone().into(),
        enrollment.course.clone().into(),
        enrollment.class.clone().into(),
        enrollment.status.clone().into(),
        enrollment.academic_term.clone().into(),
        enrollment.physical_unit.clone().into(),
        enrollment.organization.clone().into(),
        CellValue::Integer(enrollment.org_id),
        enrollment.enrolled_on.into(),
        enrollment.activated_on.into(),
        enrollment.created_on.into(),
    ]
}
