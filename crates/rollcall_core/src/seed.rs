//! Sample catalog and students.

use crate::error::CoreResult;
use crate::model::{Course, Student};
use crate::registry::Registry;
use tracing::info;

/// The sample course catalog.
#[must_use]
pub fn sample_courses() -> Vec<Course> {
    vec![
        Course::new("DB101", "Databases 101"),
        Course::new("ALGO201", "Algorithms 201"),
        Course::new("ML301", "Machine Learning 301"),
    ]
}

/// Sample students as `(name, mobile)` pairs.
pub const SAMPLE_STUDENTS: [(&str, &str); 6] = [
    ("Rob Pike", "8885551111"),
    ("Ken Thompson", "8885551112"),
    ("Robert Griesemer", "8885551113"),
    ("Russ Cox", "8885551114"),
    ("Ian Taylor", "8885551115"),
    ("Guido van Rossum", "8885551116"),
];

/// Writes the sample catalog and students and enrolls them.
///
/// Students at even positions take DB101 and ALGO201, the others ALGO201
/// and ML301. Returns the students with their assigned ids.
///
/// # Errors
///
/// Returns the first error raised by the registry.
pub fn seed(registry: &Registry) -> CoreResult<Vec<Student>> {
    let courses = sample_courses();
    for course in &courses {
        registry.add_course(course)?;
    }

    let mut students = Vec::with_capacity(SAMPLE_STUDENTS.len());
    for (index, &(name, mobile)) in SAMPLE_STUDENTS.iter().enumerate() {
        let student = registry.add_student(name, Some(mobile))?;
        let picks = if index % 2 == 0 { &courses[0..2] } else { &courses[1..3] };
        registry.enroll_student(&student, picks)?;
        students.push(student);
    }

    info!(courses = courses.len(), students = students.len(), "sample data written");
    Ok(students)
}
