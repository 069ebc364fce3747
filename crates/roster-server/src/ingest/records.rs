//! Typed records produced by row validation

use chrono::NaiveTime;

use super::types::KeyField;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassRecord {
    pub class_name: String,
    pub batch: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubjectRecord {
    pub subject_code: String,
    pub subject_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomRecord {
    pub room_number: String,
    pub building_name: String,
    pub floor_number: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnrollmentStatus {
    Pending,
    Enrolled,
    Failed,
}

impl EnrollmentStatus {
    pub const ALL: [EnrollmentStatus; 3] = [
        EnrollmentStatus::Pending,
        EnrollmentStatus::Enrolled,
        EnrollmentStatus::Failed,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EnrollmentStatus::Pending => "Pending",
            EnrollmentStatus::Enrolled => "Enrolled",
            EnrollmentStatus::Failed => "Failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StudentRecord {
    pub registration_number: String,
    pub name: String,
    /// Lowercased during validation
    pub email: String,
    pub password: String,
    pub class_name: String,
    pub enrollment_status: EnrollmentStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeacherRecord {
    pub teacher_id: String,
    pub name: String,
    pub email: String,
    pub password: String,
}

/// Teaching days; Sunday is not schedulable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DayOfWeek {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
}

impl DayOfWeek {
    pub const ALL: [DayOfWeek; 6] = [
        DayOfWeek::Monday,
        DayOfWeek::Tuesday,
        DayOfWeek::Wednesday,
        DayOfWeek::Thursday,
        DayOfWeek::Friday,
        DayOfWeek::Saturday,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            DayOfWeek::Monday => "Monday",
            DayOfWeek::Tuesday => "Tuesday",
            DayOfWeek::Wednesday => "Wednesday",
            DayOfWeek::Thursday => "Thursday",
            DayOfWeek::Friday => "Friday",
            DayOfWeek::Saturday => "Saturday",
        }
    }
}

impl std::fmt::Display for DayOfWeek {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimetableRecord {
    pub class_name: String,
    pub teacher_id: String,
    pub subject_code: String,
    pub room_number: String,
    pub day_of_week: DayOfWeek,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
}

/// A validated row of any entity type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    Class(ClassRecord),
    Subject(SubjectRecord),
    Room(RoomRecord),
    Student(StudentRecord),
    Teacher(TeacherRecord),
    Timetable(TimetableRecord),
}

impl Record {
    /// Text of a key column, if this record type has it
    pub fn field(&self, key: KeyField) -> Option<&str> {
        let value = match (self, key) {
            (Record::Class(r), KeyField::ClassName) => &r.class_name,
            (Record::Subject(r), KeyField::SubjectCode) => &r.subject_code,
            (Record::Room(r), KeyField::RoomNumber) => &r.room_number,
            (Record::Student(r), KeyField::RegistrationNumber) => &r.registration_number,
            (Record::Student(r), KeyField::Email) => &r.email,
            (Record::Student(r), KeyField::ClassName) => &r.class_name,
            (Record::Teacher(r), KeyField::TeacherId) => &r.teacher_id,
            (Record::Teacher(r), KeyField::Email) => &r.email,
            (Record::Timetable(r), KeyField::ClassName) => &r.class_name,
            (Record::Timetable(r), KeyField::TeacherId) => &r.teacher_id,
            (Record::Timetable(r), KeyField::SubjectCode) => &r.subject_code,
            (Record::Timetable(r), KeyField::RoomNumber) => &r.room_number,
            _ => return None,
        };
        Some(value.as_str())
    }

    pub fn as_timetable(&self) -> Option<&TimetableRecord> {
        match self {
            Record::Timetable(r) => Some(r),
            _ => None,
        }
    }
}
