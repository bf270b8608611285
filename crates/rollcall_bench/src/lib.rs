//! Benchmark utilities.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use rand::seq::SliceRandom;
use rand::Rng;
use rollcall_core::{ClusterConfig, FanOut, Registry, Student};

const GIVEN: [&str; 12] = [
    "Ada", "Barbara", "Dennis", "Edsger", "Frances", "Grace", "John", "Ken", "Niklaus", "Rob",
    "Tony", "Whitfield",
];

const FAMILY: [&str; 8] = [
    "Lovelace", "Liskov", "Ritchie", "Dijkstra", "Allen", "Hopper", "Backus", "Wirth",
];

/// Generate a random `Given Family` name.
pub fn random_name<R: Rng + ?Sized>(rng: &mut R) -> String {
    let given = GIVEN.choose(rng).copied().unwrap_or("Ada");
    let family = FAMILY.choose(rng).copied().unwrap_or("Lovelace");
    format!("{given} {family}")
}

/// Generate `count` random names.
pub fn random_names(count: usize) -> Vec<String> {
    let mut rng = rand::thread_rng();
    (0..count).map(|_| random_name(&mut rng)).collect()
}

/// Opens an in-memory registry with schema and the sample catalog, then
/// adds `count` random students enrolled in one random course each.
pub fn populated_registry(count: usize, fan_out: FanOut) -> (Registry, Vec<Student>) {
    let config = ClusterConfig::in_memory().with_fan_out(fan_out);
    let registry = Registry::open(&config).expect("Failed to open registry");
    registry.create_schema().expect("Failed to create schema");

    let courses = rollcall_core::sample_courses();
    for course in &courses {
        registry.add_course(course).expect("Failed to add course");
    }

    let mut rng = rand::thread_rng();
    let students = random_names(count)
        .iter()
        .map(|name| {
            let student = registry.add_student(name, None).expect("Failed to add student");
            let course = courses.choose(&mut rng).cloned().expect("Catalog is empty");
            registry
                .enroll_student(&student, &[course])
                .expect("Failed to enroll student");
            student
        })
        .collect();

    (registry, students)
}
