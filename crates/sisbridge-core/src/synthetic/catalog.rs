//! Fixed value sets the generator draws from.

pub const FIRST_NAMES_FEMALE: &[&str] = &[
    "Thando", "Naledi", "Lerato", "Ayanda", "Zanele", "Palesa", "Nomvula", "Amahle", "Lindiwe",
    "Karabo", "Refilwe", "Sarah", "Chloe", "Megan", "Aisha", "Fatima", "Anika", "Lisa",
];

pub const FIRST_NAMES_MALE: &[&str] = &[
    "Sipho", "Thabo", "Bongani", "Kagiso", "Lwazi", "Tshepo", "Mandla", "Neo", "Sibusiso",
    "Tumelo", "Pieter", "Johan", "Ethan", "Liam", "Yusuf", "Ravi", "Daniel", "Musa",
];

pub const SURNAMES: &[&str] = &[
    "Mokoena", "Dlamini", "Nkosi", "Khumalo", "Ndlovu", "Mthembu", "Sithole", "Mahlangu",
    "Botha", "Van der Merwe", "Naidoo", "Pillay", "Smith", "Jacobs", "Petersen", "Zulu",
    "Mabaso", "Molefe", "Baloyi", "Maluleke",
];

/// Official languages as `(code, description)`.
pub const LANGUAGES: &[(&str, &str)] = &[
    ("AFR", "Afrikaans"),
    ("ENG", "English"),
    ("NBL", "isiNdebele"),
    ("XHO", "isiXhosa"),
    ("ZUL", "isiZulu"),
    ("NSO", "Sepedi"),
    ("SOT", "Sesotho"),
    ("TSN", "Setswana"),
    ("SSW", "siSwati"),
    ("VEN", "Tshivenda"),
    ("TSO", "Xitsonga"),
];

/// Subjects as `(code, description)`.
pub const SUBJECTS: &[(&str, &str)] = &[
    ("MATH", "Mathematics"),
    ("ENGH", "English Home Language"),
    ("AFRF", "Afrikaans First Additional Language"),
    ("LIFE", "Life Orientation"),
    ("NSCI", "Natural Sciences"),
    ("SOCS", "Social Sciences"),
    ("TECH", "Technology"),
    ("EMS", "Economic and Management Sciences"),
    ("PHSC", "Physical Sciences"),
    ("LFSC", "Life Sciences"),
    ("ACCN", "Accounting"),
    ("GEOG", "Geography"),
];

pub const GENDERS: &[(&str, &str)] = &[("F", "Female"), ("M", "Male")];

pub const RELATIONSHIPS: &[(&str, &str)] = &[
    ("MOTHER", "Mother"),
    ("FATHER", "Father"),
    ("GUARDIAN", "Guardian"),
    ("GRANDPARENT", "Grandparent"),
];

pub const POSITIONS: &[(&str, &str)] = &[
    ("PRINCIPAL", "Principal"),
    ("DEPUTY", "Deputy Principal"),
    ("HOD", "Head of Department"),
    ("EDUCATOR", "Educator"),
    ("ADMIN", "Administrative Officer"),
];

pub const TITLES: &[&str] = &["Mr", "Ms", "Mrs", "Dr"];

pub const PROVINCES: &[&str] = &[
    "Eastern Cape",
    "Free State",
    "Gauteng",
    "KwaZulu-Natal",
    "Limpopo",
    "Mpumalanga",
    "North West",
    "Northern Cape",
    "Western Cape",
];

pub const SCHOOL_NAME_STEMS: &[&str] = &[
    "Greenfield", "Riverside", "Hillcrest", "Sunnyside", "Mountain View", "Oakdale", "Ubuntu",
    "Kwena", "Lakeside", "Protea", "Acacia", "Silverleaf",
];

/// `(phase, first grade ordinal, last grade ordinal)`; ordinal 0 is grade R.
pub const PHASES: &[(&str, u8, u8)] = &[
    ("Primary", 0, 7),
    ("Secondary", 8, 12),
    ("Combined", 0, 12),
];

/// Assessments per term as `(name, total marks)`.
pub const ASSESSMENTS: &[(&str, u32)] = &[("Test", 50), ("Examination", 100)];

/// Reference year for dates of birth and assessment dates, fixed so output
/// does not drift with the wall clock.
pub const REFERENCE_YEAR: i32 = 2025;
