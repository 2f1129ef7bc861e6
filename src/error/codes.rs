/// Error code registry for simworker
///
/// Error codes are organized by category:
/// - 1000-1999: Configuration errors
/// - 2000-2999: Transport errors
/// - 3000-3999: Service (discovery / response) errors
/// - 4000-4999: Acquisition errors
/// - 5000-5999: Adapter execution errors
/// - 6000-6999: Code base errors
/// - 7000-7999: Filesystem errors
/// - 9000-9999: Other errors
#[allow(dead_code)]
pub struct ErrorCode;

impl ErrorCode {
    // Configuration errors (1000-1999)
    pub const CONFIG_NOT_FOUND: u16 = 1001;
    pub const CONFIG_INVALID_JSON: u16 = 1003;
    pub const CONFIG_MISSING_REQUIRED: u16 = 1004;
    pub const CONFIG_INVALID_VALUE: u16 = 1005;
    pub const CONFIG_TLS: u16 = 1010;

    // Transport errors (2000-2999)
    pub const TRANSPORT_EXHAUSTED: u16 = 2001;
    pub const TRANSPORT_INVALID_URL: u16 = 2002;
    pub const TRANSPORT_CLIENT_BUILD: u16 = 2003;

    // Service errors (3000-3999)
    pub const SERVICE_NO_ENDPOINTS: u16 = 3001;
    pub const SERVICE_INVALID_RESPONSE: u16 = 3002;

    // Acquisition errors (4000-4999)
    pub const ACQUISITION_TIMEOUT: u16 = 4001;

    // Adapter execution errors (5000-5999)
    pub const EXEC_GENERIC: u16 = 5000;
    pub const EXEC_COMMAND_NOT_FOUND: u16 = 5001;
    pub const EXEC_SUBPROCESS_FAILED: u16 = 5003;
    pub const EXEC_SIGNAL_RECEIVED: u16 = 5005;
    pub const EXEC_SPAWN_FAILED: u16 = 5007;
    pub const EXEC_MONITOR_FAILED: u16 = 5011;

    // Code base errors (6000-6999)
    pub const CODEBASE_EXTRACT_FAILED: u16 = 6002;
    pub const CODEBASE_PERMISSIONS: u16 = 6003;

    // Filesystem errors (7000-7999)
    pub const IO_GENERIC: u16 = 7000;
    pub const IO_CREATE_DIR: u16 = 7001;
    pub const IO_WRITE: u16 = 7002;
    pub const IO_READ: u16 = 7003;

    // Other errors (9000-9999)
    pub const OTHER_TASK_FAILED: u16 = 9001;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_ranges() {
        assert!((1000..2000).contains(&ErrorCode::CONFIG_INVALID_VALUE));
        assert!((2000..3000).contains(&ErrorCode::TRANSPORT_EXHAUSTED));
        assert!((3000..4000).contains(&ErrorCode::SERVICE_NO_ENDPOINTS));
        assert!((4000..5000).contains(&ErrorCode::ACQUISITION_TIMEOUT));
        assert!((5000..6000).contains(&ErrorCode::EXEC_MONITOR_FAILED));
        assert!((6000..7000).contains(&ErrorCode::CODEBASE_EXTRACT_FAILED));
        assert!((7000..8000).contains(&ErrorCode::IO_READ));
        assert!((9000..10000).contains(&ErrorCode::OTHER_TASK_FAILED));
    }
}
