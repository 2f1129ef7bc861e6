use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::error::ProcessError;
use super::runner::{ExitStatus, ProcessCommand, ProcessOutput, ProcessRunner};

#[derive(Clone)]
pub struct MockProcessRunner {
    expectations: Arc<Mutex<Vec<MockExpectation>>>,
    call_history: Arc<Mutex<Vec<ProcessCommand>>>,
}

#[derive(Clone)]
struct MockBehavior {
    response: ProcessOutput,
    delay: Option<Duration>,
    /// Files written relative to the command's working directory
    files: Vec<(String, String)>,
    /// Text appended to the command's log file
    log_output: Option<String>,
}

struct MockExpectation {
    program: String,
    #[allow(clippy::type_complexity)]
    args_matcher: Option<Box<dyn Fn(&[String]) -> bool + Send + Sync>>,
    behavior: MockBehavior,
    times_called: usize,
    expected_times: Option<usize>,
}

pub struct MockCommandConfig {
    runner: MockProcessRunner,
    expectation: MockExpectation,
}

impl MockProcessRunner {
    pub fn new() -> Self {
        Self {
            expectations: Arc::new(Mutex::new(Vec::new())),
            call_history: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn expect_command(&mut self, program: &str) -> MockCommandConfig {
        MockCommandConfig {
            runner: self.clone(),
            expectation: MockExpectation {
                program: program.to_string(),
                args_matcher: None,
                behavior: MockBehavior {
                    response: ProcessOutput {
                        status: ExitStatus::Success,
                        duration: Duration::from_millis(10),
                    },
                    delay: None,
                    files: Vec::new(),
                    log_output: None,
                },
                times_called: 0,
                expected_times: None,
            },
        }
    }

    pub fn verify_called(&self, program: &str, times: usize) -> bool {
        self.call_count(program) == times
    }

    pub fn call_count(&self, program: &str) -> usize {
        let history = self.call_history.lock().unwrap();
        history.iter().filter(|cmd| cmd.program == program).count()
    }

    pub fn get_call_history(&self) -> Vec<ProcessCommand> {
        self.call_history.lock().unwrap().clone()
    }

    fn find_behavior(&self, command: &ProcessCommand) -> Result<MockBehavior, ProcessError> {
        let mut expectations = self.expectations.lock().unwrap();

        for expectation in expectations.iter_mut() {
            if expectation.program != command.program {
                continue;
            }

            if let Some(ref args_matcher) = expectation.args_matcher {
                if !(args_matcher)(&command.args) {
                    continue;
                }
            }

            expectation.times_called += 1;

            if let Some(expected) = expectation.expected_times {
                if expectation.times_called > expected {
                    return Err(ProcessError::MockExpectationNotMet(format!(
                        "Command '{}' called {} times, expected {}",
                        command.program, expectation.times_called, expected
                    )));
                }
            }

            return Ok(expectation.behavior.clone());
        }

        Err(ProcessError::MockExpectationNotMet(format!(
            "No expectation found for command: {} {:?}",
            command.program, command.args
        )))
    }

    fn apply_side_effects(
        behavior: &MockBehavior,
        command: &ProcessCommand,
    ) -> Result<(), ProcessError> {
        if let Some(dir) = &command.working_dir {
            for (name, contents) in &behavior.files {
                std::fs::write(dir.join(name), contents)?;
            }
        }

        if let (Some(log), Some(text)) = (&command.log_file, &behavior.log_output) {
            use std::io::Write;
            let mut file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(log)?;
            file.write_all(text.as_bytes())?;
        }
        Ok(())
    }
}

#[async_trait]
impl ProcessRunner for MockProcessRunner {
    async fn run(&self, command: ProcessCommand) -> Result<ProcessOutput, ProcessError> {
        self.call_history.lock().unwrap().push(command.clone());

        let behavior = self.find_behavior(&command)?;

        if let Some(delay) = behavior.delay {
            tokio::time::sleep(delay).await;
        }

        Self::apply_side_effects(&behavior, &command)?;

        Ok(behavior.response)
    }
}

impl MockCommandConfig {
    pub fn with_args<F>(mut self, matcher: F) -> Self
    where
        F: Fn(&[String]) -> bool + Send + Sync + 'static,
    {
        self.expectation.args_matcher = Some(Box::new(matcher));
        self
    }

    pub fn returns_exit_code(mut self, code: i32) -> Self {
        self.expectation.behavior.response.status = if code == 0 {
            ExitStatus::Success
        } else {
            ExitStatus::Error(code)
        };
        self
    }

    pub fn returns_success(mut self) -> Self {
        self.expectation.behavior.response.status = ExitStatus::Success;
        self
    }

    /// Sleep before completing, simulating a long-running program
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.expectation.behavior.delay = Some(delay);
        self
    }

    /// Write a file into the working directory when the command runs
    pub fn creates_file(mut self, name: &str, contents: &str) -> Self {
        self.expectation
            .behavior
            .files
            .push((name.to_string(), contents.to_string()));
        self
    }

    /// Append text to the command's log file when it runs
    pub fn logs(mut self, text: &str) -> Self {
        self.expectation.behavior.log_output = Some(text.to_string());
        self
    }

    pub fn times(mut self, n: usize) -> Self {
        self.expectation.expected_times = Some(n);
        self
    }

    pub fn finish(self) {
        self.runner
            .expectations
            .lock()
            .unwrap()
            .push(self.expectation);
    }
}

impl Default for MockProcessRunner {
    fn default() -> Self {
        Self::new()
    }
}
