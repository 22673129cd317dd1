pub mod job;
pub mod output;
pub mod video;

pub use job::{
    job_key, JobData, JobProgress, JobResult, JobStatus, JobType, Priority, RenditionResult,
    TranscodingJob,
};
pub use output::{OutputStatus, ResolutionProfile, VideoOutput};
pub use video::{Paginated, SortOrder, Video, VideoListQuery, VideoStatus};
