/// Tunables for one schedule pass (spec §4.7), mirroring the
/// `SchedulerConfig`/`SizingPolicy` knob structs the teacher keeps next to
/// its scheduling logic rather than folding into the types they configure.
#[derive(Clone, Debug)]
pub struct SchedulerConfig {
    /// A node unreachable (or reporting `unknown` for a batch) longer than
    /// this many seconds is treated as lost (Phase R).
    pub node_timeout_sec: i64,
    /// Transport-failure retries before a launch attempt gives up and the
    /// batch is marked `failed` (Phase A).
    pub max_launch_attempts: u32,
    /// Retries allowed for a retryable failure reason before it sticks
    /// (retry policy).
    pub retry_limit: u32,
    /// Per-RPC timeout wrapping every SecretClient/NodeAgentClient call
    /// inside a pass (spec §5); expiry counts as a transport failure.
    pub rpc_timeout_sec: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            node_timeout_sec: 30,
            max_launch_attempts: 5,
            retry_limit: 2,
            rpc_timeout_sec: 10,
        }
    }
}
