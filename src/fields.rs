//! Closed set of roster columns.
//!
//! Every column the MIS spreadsheet carries, plus the derived placement date,
//! is a [`Field`] variant. Value kind and mutability are properties of the
//! variant, so "is this editable" is answered by a `match`, never by looking a
//! name up in a list.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    SrNo,
    RegNo,
    StudentName,
    Gender,
    Course,
    ResumeStatus,
    SeekingPlacement,
    Department,
    OfferLetterStatus,
    Status,
    CompanyName,
    Designation,
    Ctc,
    JoiningDate,
    JoiningStatus,
    SchoolName,
    MobileNumber,
    Email,
    GraduationCourse,
    GraduationOgpa,
    Percent10,
    Percent12,
    Backlogs,
    Hometown,
    Address,
    Reason,
    PlacedDate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    /// Spreadsheet row number, parsed through float then int.
    Serial,
    Text,
    Number,
    /// Percentage that may have been entered as a fraction.
    Percentage,
    /// Grade point average; may carry a `CGPA`/`OGPA` prefix.
    Score,
    Count,
    Date,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mutability {
    Key,
    Editable,
    Derived,
}

impl Field {
    /// Spreadsheet columns in template order.
    pub const SPREADSHEET: [Field; 26] = [
        Field::SrNo,
        Field::RegNo,
        Field::StudentName,
        Field::Gender,
        Field::Course,
        Field::ResumeStatus,
        Field::SeekingPlacement,
        Field::Department,
        Field::OfferLetterStatus,
        Field::Status,
        Field::CompanyName,
        Field::Designation,
        Field::Ctc,
        Field::JoiningDate,
        Field::JoiningStatus,
        Field::SchoolName,
        Field::MobileNumber,
        Field::Email,
        Field::GraduationCourse,
        Field::GraduationOgpa,
        Field::Percent10,
        Field::Percent12,
        Field::Backlogs,
        Field::Hometown,
        Field::Address,
        Field::Reason,
    ];

    pub fn key(self) -> &'static str {
        match self {
            Field::SrNo => "sr_no",
            Field::RegNo => "reg_no",
            Field::StudentName => "student_name",
            Field::Gender => "gender",
            Field::Course => "course",
            Field::ResumeStatus => "resume_status",
            Field::SeekingPlacement => "seeking_placement",
            Field::Department => "department",
            Field::OfferLetterStatus => "offer_letter_status",
            Field::Status => "status",
            Field::CompanyName => "company_name",
            Field::Designation => "designation",
            Field::Ctc => "ctc",
            Field::JoiningDate => "joining_date",
            Field::JoiningStatus => "joining_status",
            Field::SchoolName => "school_name",
            Field::MobileNumber => "mobile_number",
            Field::Email => "email",
            Field::GraduationCourse => "graduation_course",
            Field::GraduationOgpa => "graduation_ogpa",
            Field::Percent10 => "percent_10",
            Field::Percent12 => "percent_12",
            Field::Backlogs => "backlogs",
            Field::Hometown => "hometown",
            Field::Address => "address",
            Field::Reason => "reason",
            Field::PlacedDate => "placed_date",
        }
    }

    /// Header label used by the MIS template.
    pub fn label(self) -> &'static str {
        match self {
            Field::SrNo => "Sr No",
            Field::RegNo => "Registration Number",
            Field::StudentName => "Student Name",
            Field::Gender => "Gender",
            Field::Course => "Course",
            Field::ResumeStatus => "Resume Status",
            Field::SeekingPlacement => "Seeking Placement",
            Field::Department => "Department",
            Field::OfferLetterStatus => "Offer Letters Status",
            Field::Status => "Status",
            Field::CompanyName => "Company Name",
            Field::Designation => "Designation",
            Field::Ctc => "CTC",
            Field::JoiningDate => "Joining Date",
            Field::JoiningStatus => "Joining Status",
            Field::SchoolName => "School Name",
            Field::MobileNumber => "Mobile Number",
            Field::Email => "Email ID",
            Field::GraduationCourse => "Graduation Course",
            Field::GraduationOgpa => "Graduation/OGPA",
            Field::Percent10 => "10%",
            Field::Percent12 => "12%",
            Field::Backlogs => "No of Backlogs",
            Field::Hometown => "Hometown",
            Field::Address => "Address",
            Field::Reason => "Reason",
            Field::PlacedDate => "Placed Date",
        }
    }

    pub fn kind(self) -> ValueKind {
        match self {
            Field::SrNo => ValueKind::Serial,
            Field::Ctc => ValueKind::Number,
            Field::Percent10 | Field::Percent12 => ValueKind::Percentage,
            Field::GraduationOgpa => ValueKind::Score,
            Field::Backlogs => ValueKind::Count,
            Field::PlacedDate => ValueKind::Date,
            _ => ValueKind::Text,
        }
    }

    pub fn mutability(self) -> Mutability {
        match self {
            Field::RegNo => Mutability::Key,
            Field::PlacedDate => Mutability::Derived,
            _ => Mutability::Editable,
        }
    }

    pub fn is_editable(self) -> bool {
        self.mutability() == Mutability::Editable
    }

    pub fn from_key(key: &str) -> Option<Field> {
        let key = key.trim();
        Field::SPREADSHEET
            .into_iter()
            .chain(std::iter::once(Field::PlacedDate))
            .find(|field| field.key() == key)
    }
}

impl std::fmt::Display for Field {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_round_trip_through_lookup() {
        for field in Field::SPREADSHEET {
            assert_eq!(Field::from_key(field.key()), Some(field));
        }
        assert_eq!(Field::from_key("placed_date"), Some(Field::PlacedDate));
        assert_eq!(Field::from_key("salary"), None);
    }

    #[test]
    fn key_and_derived_fields_are_not_editable() {
        assert!(!Field::RegNo.is_editable());
        assert!(!Field::PlacedDate.is_editable());
        assert!(Field::Status.is_editable());
        assert!(Field::Ctc.is_editable());
    }
}
