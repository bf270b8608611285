//! Enrollment operations over a partitioned cluster.
//!
//! Students and their enrollments live in the partition chosen by the
//! student's name. Courses are written to every partition so that joins
//! between enrollments and courses stay local to one partition.

use crate::config::{ClusterConfig, FanOut};
use crate::error::{CoreError, CoreResult};
use crate::model::{Course, Enrollment, Student};
use crate::partition::{Partition, PartitionManager};
use crate::scatter::{BatchQuery, ScatterGather};
use crate::schema;
use rollcall_store::{Executed, QueryGuard, Value};
use std::collections::HashMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, info};

const INSERT_COURSE: &str = "INSERT INTO courses (code, name) VALUES (?1, ?2)";

const SELECT_COURSE: &str = "SELECT code, name FROM courses WHERE code = ?1";

const SELECT_COURSES: &str = "SELECT code, name FROM courses ORDER BY code";

const INSERT_STUDENT: &str = "INSERT INTO students (name, mobile) VALUES (?1, ?2)";

const SELECT_STUDENT: &str = "SELECT id, name, mobile FROM students WHERE id = ?1 AND name = ?2";

const SELECT_STUDENTS_NAMED: &str = "SELECT id, name, mobile FROM students WHERE name = ?1 ORDER BY id";

const SELECT_STUDENTS: &str = "SELECT id, name, mobile FROM students ORDER BY id";

const INSERT_ENROLLMENT: &str = "INSERT INTO enrollment (student_id, course_code, date_enrolled, final_grade) \
                                 VALUES (?1, ?2, ?3, NULL)";

const UPDATE_GRADE: &str = "UPDATE enrollment SET final_grade = ?3 \
                            WHERE student_id = ?1 AND course_code = ?2";

const SELECT_ENROLLMENTS: &str = "SELECT student_id, course_code, date_enrolled, final_grade \
                                  FROM enrollment WHERE student_id = ?1 ORDER BY course_code";

const COURSES_FOR_STUDENT: &str = "SELECT c.code, c.name \
                                   FROM enrollment AS e \
                                   JOIN courses AS c ON e.course_code = c.code \
                                   JOIN students AS s ON e.student_id = s.id \
                                   WHERE s.name = ?1 \
                                   ORDER BY c.code";

const STUDENTS_IN_COURSE: &str = "SELECT s.id, s.name, s.mobile \
                                  FROM enrollment AS e \
                                  JOIN students AS s ON e.student_id = s.id \
                                  WHERE e.course_code = ?1 \
                                  ORDER BY s.id";

const COURSES_FOR_STUDENTS: &str = "SELECT s.id, c.code, c.name \
                                    FROM students AS s \
                                    LEFT JOIN enrollment AS e ON s.id = e.student_id \
                                    LEFT JOIN courses AS c ON e.course_code = c.code \
                                    WHERE s.id IN ({ids}) \
                                    ORDER BY s.id, c.code";

/// Domain operations for students, courses and enrollments.
///
/// The registry owns its [`PartitionManager`]. Every statement it issues
/// runs under a fresh deadline of the configured query timeout.
#[derive(Debug)]
pub struct Registry {
    manager: PartitionManager,
    timeout: Duration,
    fan_out: FanOut,
}

impl Registry {
    /// Wraps an existing manager.
    #[must_use]
    pub fn new(manager: PartitionManager, timeout: Duration) -> Self {
        Self {
            manager,
            timeout,
            fan_out: FanOut::default(),
        }
    }

    /// Sets the scatter-gather execution mode.
    #[must_use]
    pub const fn with_fan_out(mut self, fan_out: FanOut) -> Self {
        self.fan_out = fan_out;
        self
    }

    /// Opens every configured partition.
    ///
    /// # Errors
    ///
    /// Returns an error if a store cannot be opened or the layout is invalid.
    pub fn open(config: &ClusterConfig) -> CoreResult<Self> {
        let manager = PartitionManager::open(config)?;
        Ok(Self::new(manager, config.query_timeout()).with_fan_out(config.fan_out))
    }

    /// Returns the partition manager.
    #[must_use]
    pub fn manager(&self) -> &PartitionManager {
        &self.manager
    }

    /// Returns the per-statement deadline.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Returns the scatter-gather executor bound to this registry's settings.
    #[must_use]
    pub fn scatter(&self) -> ScatterGather<'_> {
        ScatterGather::new(&self.manager, self.timeout).with_fan_out(self.fan_out)
    }

    /// Creates the tables on every partition.
    ///
    /// # Errors
    ///
    /// Returns the first partition's storage error.
    pub fn create_schema(&self) -> CoreResult<()> {
        schema::create_schema(&self.manager)
    }

    /// Adds a course to every partition.
    ///
    /// Partitions are written in order and the first failure stops the
    /// broadcast. Partitions written before the failure keep the course.
    ///
    /// # Errors
    ///
    /// Returns `NoEffect` if a partition did not insert exactly one row, or
    /// the first storage or timeout error.
    pub fn add_course(&self, course: &Course) -> CoreResult<()> {
        self.manager.ensure_open()?;
        let params = [Value::from(course.code.as_str()), Value::from(course.name.as_str())];

        for partition in self.manager.partitions() {
            let executed = partition.execute(INSERT_COURSE, &params, &self.guard())?;
            expect_rows(executed, 1, || format!("add course {}", course.code))?;
        }

        info!(code = %course.code, partitions = self.manager.partitions().len(), "course added");
        Ok(())
    }

    /// Reads one course from the catalog.
    ///
    /// # Errors
    ///
    /// Returns a storage, timeout or decode error.
    pub fn get_course(&self, code: &str) -> CoreResult<Option<Course>> {
        let rows = self
            .catalog()?
            .query(SELECT_COURSE, &[Value::from(code)], &self.guard())?;
        rows.first().map(|row| Course::from_row(row, 0)).transpose()
    }

    /// Lists the catalog, ordered by code.
    ///
    /// # Errors
    ///
    /// Returns a storage, timeout or decode error.
    pub fn list_courses(&self) -> CoreResult<Vec<Course>> {
        self.catalog()?
            .query(SELECT_COURSES, &[], &self.guard())?
            .iter()
            .map(|row| Course::from_row(row, 0))
            .collect()
    }

    /// Adds a student to the partition selected by `name`.
    ///
    /// The returned student carries the id assigned by that partition.
    ///
    /// # Errors
    ///
    /// Returns a resolution error, `NoEffect`, or a storage or timeout error.
    pub fn add_student(&self, name: &str, mobile: Option<&str>) -> CoreResult<Student> {
        let partition = self.manager.resolve(name)?;
        let executed = partition.execute(
            INSERT_STUDENT,
            &[Value::from(name), Value::from(mobile)],
            &self.guard(),
        )?;
        expect_rows(executed, 1, || format!("add student {name}"))?;

        debug!(partition = %partition.name(), id = executed.last_insert_id, "student added");
        Ok(Student::new(
            executed.last_insert_id,
            name,
            mobile.map(str::to_owned),
        ))
    }

    /// Reads a student by name and partition-local id.
    ///
    /// # Errors
    ///
    /// Returns a resolution, storage, timeout or decode error.
    pub fn get_student(&self, name: &str, id: i64) -> CoreResult<Option<Student>> {
        let partition = self.manager.resolve(name)?;
        let rows = partition.query(
            SELECT_STUDENT,
            &[Value::Integer(id), Value::from(name)],
            &self.guard(),
        )?;
        rows.first().map(|row| Student::from_row(row, 0)).transpose()
    }

    /// Lists every student with exactly this name, from its partition.
    ///
    /// # Errors
    ///
    /// Returns a resolution, storage, timeout or decode error.
    pub fn find_students(&self, name: &str) -> CoreResult<Vec<Student>> {
        self.manager
            .resolve(name)?
            .query(SELECT_STUDENTS_NAMED, &[Value::from(name)], &self.guard())?
            .iter()
            .map(|row| Student::from_row(row, 0))
            .collect()
    }

    /// Lists the students of every partition, in partition order.
    ///
    /// # Errors
    ///
    /// Returns the first storage, timeout or decode error.
    pub fn list_students(&self) -> CoreResult<Vec<Student>> {
        self.scatter()
            .query_all(SELECT_STUDENTS, &[], |row| Student::from_row(row, 0))
    }

    /// Enrolls a student in each of `courses`, timestamped now.
    ///
    /// # Errors
    ///
    /// Returns a resolution error, `NoEffect`, or the first storage or
    /// timeout error. Enrollments inserted before a failure are kept.
    pub fn enroll_student(&self, student: &Student, courses: &[Course]) -> CoreResult<()> {
        let partition = self.manager.resolve(&student.name)?;

        for course in courses {
            let executed = partition.execute(
                INSERT_ENROLLMENT,
                &[
                    Value::Integer(student.id),
                    Value::from(course.code.as_str()),
                    Value::Integer(unix_now()),
                ],
                &self.guard(),
            )?;
            expect_rows(executed, 1, || {
                format!("enroll {} in {}", student.name, course.code)
            })?;
        }

        debug!(
            partition = %partition.name(),
            student = student.id,
            courses = courses.len(),
            "student enrolled"
        );
        Ok(())
    }

    /// Records a student's final grade for a course.
    ///
    /// # Errors
    ///
    /// Returns `NoEffect` if the student is not enrolled in the course.
    pub fn set_final_grade(&self, student: &Student, course_code: &str, grade: &str) -> CoreResult<()> {
        let partition = self.manager.resolve(&student.name)?;
        let executed = partition.execute(
            UPDATE_GRADE,
            &[
                Value::Integer(student.id),
                Value::from(course_code),
                Value::from(grade),
            ],
            &self.guard(),
        )?;
        expect_rows(executed, 1, || {
            format!("grade {} in {course_code}", student.name)
        })
    }

    /// Lists a student's enrollments, ordered by course code.
    ///
    /// # Errors
    ///
    /// Returns a resolution, storage, timeout or decode error.
    pub fn enrollments_for(&self, student: &Student) -> CoreResult<Vec<Enrollment>> {
        self.manager
            .resolve(&student.name)?
            .query(SELECT_ENROLLMENTS, &[Value::Integer(student.id)], &self.guard())?
            .iter()
            .map(Enrollment::from_row)
            .collect()
    }

    /// Lists the courses of every student named `name`.
    ///
    /// # Errors
    ///
    /// Returns a resolution, storage, timeout or decode error.
    pub fn courses_for_student(&self, name: &str) -> CoreResult<Vec<Course>> {
        self.manager
            .resolve(name)?
            .query(COURSES_FOR_STUDENT, &[Value::from(name)], &self.guard())?
            .iter()
            .map(|row| Course::from_row(row, 0))
            .collect()
    }

    /// Lists the students enrolled in a course, across every partition.
    ///
    /// # Errors
    ///
    /// Returns the first storage, timeout or decode error.
    pub fn students_in_course(&self, course_code: &str) -> CoreResult<Vec<Student>> {
        self.scatter().query_all(
            STUDENTS_IN_COURSE,
            &[Value::from(course_code)],
            |row| Student::from_row(row, 0),
        )
    }

    /// Lists the courses of several students with one query per partition.
    ///
    /// Every distinct input student is a key of the result; students with
    /// no enrollments map to an empty list.
    ///
    /// # Errors
    ///
    /// Returns the first resolution, storage, timeout or decode error.
    pub fn courses_for_students(&self, students: &[Student]) -> CoreResult<HashMap<Student, Vec<Course>>> {
        let query = BatchQuery::new(COURSES_FOR_STUDENTS)?;
        self.scatter().fetch_associations(students, &query, |row| {
            let owner = row.integer(0).map_err(|e| CoreError::decode(&e))?;
            Ok((owner, Course::from_outer_row(row, 1)?))
        })
    }

    /// Closes every partition.
    ///
    /// # Errors
    ///
    /// Returns the first error raised while closing.
    pub fn shutdown(&self) -> CoreResult<()> {
        self.manager.shutdown()
    }

    fn guard(&self) -> QueryGuard {
        QueryGuard::new(self.timeout)
    }

    /// The partition catalog reads go to.
    fn catalog(&self) -> CoreResult<&Partition> {
        self.manager.ensure_open()?;
        self.manager
            .partitions()
            .first()
            .ok_or_else(|| CoreError::invalid_config("no partitions"))
    }
}

fn expect_rows(
    executed: Executed,
    expected: usize,
    operation: impl FnOnce() -> String,
) -> CoreResult<()> {
    if executed.rows_affected == expected {
        Ok(())
    } else {
        Err(CoreError::no_effect(operation(), expected, executed.rows_affected))
    }
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| i64::try_from(elapsed.as_secs()).unwrap_or(i64::MAX))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> Registry {
        let registry = Registry::open(&ClusterConfig::in_memory()).unwrap();
        registry.create_schema().unwrap();
        registry
    }

    fn db101() -> Course {
        Course::new("DB101", "Databases 101")
    }

    #[test]
    fn add_course_reaches_every_partition() {
        let registry = registry();
        registry.add_course(&db101()).unwrap();

        let guard = QueryGuard::new(Duration::from_secs(5));
        for partition in registry.manager().partitions() {
            let rows = partition
                .query(SELECT_COURSE, &[Value::from("DB101")], &guard)
                .unwrap();
            assert_eq!(rows.len(), 1);
        }
        assert_eq!(registry.get_course("DB101").unwrap(), Some(db101()));
        assert_eq!(registry.get_course("ML301").unwrap(), None);
    }

    #[test]
    fn duplicate_course_is_storage_error() {
        let registry = registry();
        registry.add_course(&db101()).unwrap();
        let err = registry.add_course(&db101()).unwrap_err();
        assert!(matches!(err, CoreError::Storage { .. }));
        assert_eq!(err.partition(), Some("enrollment1.db"));
    }

    #[test]
    fn add_student_assigns_partition_local_ids() {
        let registry = registry();
        let ken = registry.add_student("Ken Thompson", Some("8885551112")).unwrap();
        let rob = registry.add_student("Rob Pike", None).unwrap();
        let guido = registry.add_student("Guido van Rossum", None).unwrap();

        assert_eq!(ken.id, 1);
        assert_eq!(rob.id, 1);
        assert_eq!(guido.id, 2);
        assert_eq!(registry.get_student("Ken Thompson", 1).unwrap(), Some(ken));
        assert_eq!(registry.get_student("Rob Pike", 2).unwrap(), None);
    }

    #[test]
    fn find_students_matches_exact_name() {
        let registry = registry();
        let first = registry.add_student("Russ Cox", None).unwrap();
        let second = registry.add_student("Russ Cox", Some("8885551114")).unwrap();
        registry.add_student("Russell", None).unwrap();

        assert_eq!(registry.find_students("Russ Cox").unwrap(), vec![first, second]);
        assert!(registry.find_students("Nobody").unwrap().is_empty());
    }

    #[test]
    fn add_student_with_empty_name_is_resolution_error() {
        let registry = registry();
        let err = registry.add_student("  ", None).unwrap_err();
        assert!(err.is_resolution());
    }

    #[test]
    fn list_students_concatenates_partitions() {
        let registry = registry();
        registry.add_student("Rob Pike", None).unwrap();
        registry.add_student("Ken Thompson", None).unwrap();

        let names: Vec<String> = registry
            .list_students()
            .unwrap()
            .into_iter()
            .map(|s| s.name)
            .collect();
        assert_eq!(names, vec!["Ken Thompson", "Rob Pike"]);
    }

    #[test]
    fn enroll_and_grade() {
        let registry = registry();
        registry.add_course(&db101()).unwrap();
        let ken = registry.add_student("Ken Thompson", None).unwrap();

        registry.enroll_student(&ken, &[db101()]).unwrap();
        registry.set_final_grade(&ken, "DB101", "A").unwrap();

        let enrollments = registry.enrollments_for(&ken).unwrap();
        assert_eq!(enrollments.len(), 1);
        assert_eq!(enrollments[0].course_code, "DB101");
        assert_eq!(enrollments[0].final_grade.as_deref(), Some("A"));
        assert!(enrollments[0].date_enrolled > 0);
    }

    #[test]
    fn grade_without_enrollment_has_no_effect() {
        let registry = registry();
        let ken = registry.add_student("Ken Thompson", None).unwrap();
        let err = registry.set_final_grade(&ken, "DB101", "A").unwrap_err();
        assert!(matches!(
            err,
            CoreError::NoEffect {
                expected: 1,
                affected: 0,
                ..
            }
        ));
    }

    #[test]
    fn enrolling_in_unknown_course_fails() {
        let registry = registry();
        let ken = registry.add_student("Ken Thompson", None).unwrap();
        let err = registry
            .enroll_student(&ken, &[Course::new("NOPE", "Missing")])
            .unwrap_err();
        assert!(matches!(err, CoreError::Storage { .. }));
    }

    #[test]
    fn students_in_course_spans_partitions() {
        let registry = registry();
        registry.add_course(&db101()).unwrap();
        let ken = registry.add_student("Ken Thompson", None).unwrap();
        let rob = registry.add_student("Rob Pike", None).unwrap();
        registry.enroll_student(&ken, &[db101()]).unwrap();
        registry.enroll_student(&rob, &[db101()]).unwrap();

        assert_eq!(registry.students_in_course("DB101").unwrap(), vec![ken, rob]);
        assert!(registry.students_in_course("ML301").unwrap().is_empty());
    }

    #[test]
    fn operations_after_shutdown_fail() {
        let registry = registry();
        registry.shutdown().unwrap();

        assert!(matches!(registry.list_courses(), Err(CoreError::ShutDown)));
        assert!(matches!(registry.add_student("Ken", None), Err(CoreError::ShutDown)));
        assert!(matches!(registry.list_students(), Err(CoreError::ShutDown)));
        assert!(matches!(registry.add_course(&db101()), Err(CoreError::ShutDown)));
    }
}
