//! Demo command implementation.
//!
//! Prints the three sample reports against data written by `build`.

use super::query::{courses_by_student, print_courses, print_students, StudentCourses};
use crate::error::CliResult;
use rollcall_core::Registry;

const PAIR: [&str; 2] = ["Ken Thompson", "Rob Pike"];

/// Runs the demo command.
pub fn run(registry: &Registry) -> CliResult<()> {
    println!("*** Courses for Ken Thompson ***");
    print_courses(&registry.courses_for_student("Ken Thompson")?);

    println!("*** Students in DB101 ***");
    print_students(&registry.students_in_course("DB101")?);

    println!("*** Courses for Ken Thompson and Rob Pike (one query per partition) ***");
    for entry in pair_report(registry)? {
        println!("{}:", entry.student);
        print_courses(&entry.courses);
    }

    Ok(())
}

/// Looks up both students by name and batches their course lookup.
fn pair_report(registry: &Registry) -> CliResult<Vec<StudentCourses>> {
    let mut students = Vec::new();
    for name in PAIR {
        students.extend(registry.find_students(name)?);
    }
    courses_by_student(registry, &students)
}
