pub mod attachment;
pub mod classroom;
pub mod exam;
pub mod loaders;
pub mod material;
pub mod message;
pub mod profile;

pub use attachment::{guess_mime_type, Attachment, StoredFile};
pub use classroom::{Class, Student};
pub use exam::{
    Assignment, AssignmentStatus, Exam, ExamDraft, ExamResult, ExamStatus, Grade, QuestionSet,
};
pub use loaders::{load_seed, Seed};
pub use material::{Material, MaterialStatus};
pub use message::{
    Envelope, ExamRequested, ExamSettings, GradeRequested, MaterialReady, Message,
    ProfileRefresh, Topic, SCHEMA_VERSION,
};
pub use profile::{ProfileDraft, StudentProfile};
