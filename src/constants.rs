pub mod defaults {

    pub const TOP_K: usize = 5;

    pub const STATUS_POLL_SECONDS: u64 = 30;

    pub const PLACEHOLDER_IMAGE_URL: &str = "/uploads/placeholder.png";

    /// ChestX-ray14 finding labels, in model output order.
    pub const CLASS_NAMES: &[&str] = &[
        "Atelectasis",
        "Cardiomegaly",
        "Consolidation",
        "Edema",
        "Effusion",
        "Emphysema",
        "Fibrosis",
        "Hernia",
        "Infiltration",
        "Mass",
        "Nodule",
        "Pleural_Thickening",
        "Pneumonia",
        "Pneumothorax",
    ];

    pub const TEST_USER_NAME: &str = "Test";

    pub const TEST_USER_EMAIL: &str = "test@gmail.com";

    pub const TEST_USER_PASSWORD: &str = "test123";
}

pub mod limits {

    pub const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

    pub const MIN_PASSWORD_LEN: usize = 6;

    pub const MAX_NAME_LEN: usize = 100;

    pub const DEFAULT_HISTORY_LIMIT: u64 = 50;

    pub const MAX_HISTORY_LIMIT: u64 = 500;
}

pub mod routes {

    pub const UPLOADS_PREFIX: &str = "/uploads";
}
