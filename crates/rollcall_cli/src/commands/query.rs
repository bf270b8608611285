//! Query command implementations.

use super::{print_json, Format};
use crate::error::CliResult;
use rollcall_core::{Course, Registry, Student};
use serde::Serialize;
use tracing::warn;

/// One student and the courses they take.
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct StudentCourses {
    /// The student.
    pub student: Student,
    /// The student's courses, ordered by code.
    pub courses: Vec<Course>,
}

/// Lists the courses of a student.
pub fn courses(registry: &Registry, name: &str, format: Format) -> CliResult<()> {
    let courses = registry.courses_for_student(name)?;
    match format {
        Format::Json => print_json(&courses),
        Format::Text => {
            println!("Courses for {name}:");
            print_courses(&courses);
            Ok(())
        }
    }
}

/// Lists the students enrolled in a course.
pub fn roster(registry: &Registry, code: &str, format: Format) -> CliResult<()> {
    let students = registry.students_in_course(code)?;
    match format {
        Format::Json => print_json(&students),
        Format::Text => {
            println!("Students in {code}:");
            print_students(&students);
            Ok(())
        }
    }
}

/// Lists every student.
pub fn students(registry: &Registry, format: Format) -> CliResult<()> {
    let students = registry.list_students()?;
    match format {
        Format::Json => print_json(&students),
        Format::Text => {
            print_students(&students);
            Ok(())
        }
    }
}

/// Lists the courses of every student with one of `names`.
pub fn batch(registry: &Registry, names: &[String], format: Format) -> CliResult<()> {
    let mut students = Vec::new();
    for name in names {
        let found = registry.find_students(name)?;
        if found.is_empty() {
            warn!(name = %name, "no such student");
        }
        students.extend(found);
    }

    let report = courses_by_student(registry, &students)?;
    match format {
        Format::Json => print_json(&report),
        Format::Text => {
            for entry in &report {
                println!("{}:", entry.student);
                print_courses(&entry.courses);
            }
            Ok(())
        }
    }
}

/// Runs the batched lookup and orders the result by name, then id.
pub fn courses_by_student(registry: &Registry, students: &[Student]) -> CliResult<Vec<StudentCourses>> {
    let mut report: Vec<StudentCourses> = registry
        .courses_for_students(students)?
        .into_iter()
        .map(|(student, courses)| StudentCourses { student, courses })
        .collect();
    report.sort_by(|a, b| {
        a.student
            .name
            .cmp(&b.student.name)
            .then(a.student.id.cmp(&b.student.id))
    });
    Ok(report)
}

pub(crate) fn print_courses(courses: &[Course]) {
    if courses.is_empty() {
        println!("  (none)");
    }
    for course in courses {
        println!("  {:<10} {}", course.code, course.name);
    }
}

pub(crate) fn print_students(students: &[Student]) {
    if students.is_empty() {
        println!("  (none)");
    }
    for student in students {
        println!(
            "  {:>4}  {:<20} {}",
            student.id,
            student.name,
            student.mobile.as_deref().unwrap_or("-")
        );
    }
}
