//! The suspendable tree-walking executor: a stack of execution frames, a
//! step-level lifecycle callback protocol, request dispatch with
//! cancellation and timeout, and condition/loop control flow.
//!
//! Scheduling is single-threaded cooperative: at most one step runs at a
//! time, and the only suspension points are the awaited HTTP call, the
//! inter-step delay, and the inter-iteration continuous-run delay.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use serde_json::Value;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::condition;
use crate::context::RuntimeContext;
use crate::errors::FlowError;
use crate::extraction::{self, ExtractionOutcome};
use crate::model::{ExecutionFrame, Flow, FrameKind, Step, StepResult, StepStatus};
use crate::substitution;

/// Fired when a loop or condition step emits an informational marker
/// result that isn't itself a step occurrence (Loop Start/Iteration/End,
/// Condition Result).
#[derive(Debug, Clone)]
pub struct Marker {
    pub label: String,
    pub detail: Option<String>,
}

/// Everything the host UI needs to hear about during a run. Default method
/// bodies make each callback optional; implement only the ones a given
/// host actually renders.
pub trait RunnerCallbacks: Send + Sync {
    fn on_step_start(&self, _step: &Step, _path: &[String]) {}
    fn on_step_complete(&self, _result: &StepResult, _step: &Step, _context: &RuntimeContext, _path: &[String]) {}
    fn on_marker(&self, _marker: &Marker) {}
    fn on_context_update(&self, _context: &RuntimeContext) {}
    fn on_flow_complete(&self, _results: &[StepResult]) {}
    fn on_flow_stopped(&self, _results: &[StepResult]) {}
    fn on_error(&self, _error: &FlowError) {}
    fn on_message(&self, _message: &str) {}
    fn on_iteration_start(&self, _iteration: u64) {}
}

/// A callback sink that does nothing; useful for headless runs (tests,
/// the CLI's `validate`-only paths) that don't need reporting.
pub struct NoopCallbacks;
impl RunnerCallbacks for NoopCallbacks {}

#[derive(Debug, Clone)]
pub struct RunnerLimits {
    pub request_timeout: Duration,
    pub inter_step_delay: Duration,
    pub inter_iteration_delay: Duration,
}

impl Default for RunnerLimits {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            inter_step_delay: Duration::ZERO,
            inter_iteration_delay: Duration::ZERO,
        }
    }
}

/// Reasons a request step can produce an `error` result without ever
/// reaching the wire's status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RequestFailureReason {
    UserStopped,
    Timeout,
    Network,
}

impl RequestFailureReason {
    fn message(self, detail: &str) -> String {
        match self {
            Self::UserStopped => "request aborted by user".to_string(),
            Self::Timeout => "request timed out after 30s".to_string(),
            Self::Network => format!("network error: {detail}"),
        }
    }
}

/// The suspendable interpreter. One instance runs one flow at a time;
/// `run`/`step` reject synchronously if already active. Continuous mode
/// keeps re-running the same flow model after each completion until
/// `stop()` is called.
pub struct FlowRunner {
    client: Client,
    limits: RunnerLimits,
    callbacks: Arc<dyn RunnerCallbacks>,
    cancel: CancellationToken,

    is_running: Mutex<bool>,
    is_stepping: Mutex<bool>,
    stop_requested: Mutex<bool>,

    frames: Mutex<Vec<ExecutionFrame>>,
    results: Mutex<Vec<StepResult>>,

    continuous_active: Mutex<bool>,
    continuous_flow: Mutex<Option<Flow>>,
    iteration: Mutex<u64>,
}

impl FlowRunner {
    pub fn new(limits: RunnerLimits, callbacks: Arc<dyn RunnerCallbacks>) -> Self {
        Self {
            client: Client::new(),
            limits,
            callbacks,
            cancel: CancellationToken::new(),
            is_running: Mutex::new(false),
            is_stepping: Mutex::new(false),
            stop_requested: Mutex::new(false),
            frames: Mutex::new(Vec::new()),
            results: Mutex::new(Vec::new()),
            continuous_active: Mutex::new(false),
            continuous_flow: Mutex::new(None),
            iteration: Mutex::new(0),
        }
    }

    /// Idempotent. Signals every in-flight suspension point (request,
    /// inter-step delay, continuous-run delay) to bail out at its next
    /// checkpoint, and deactivates continuous mode.
    pub async fn stop(&self) {
        *self.stop_requested.lock().await = true;
        *self.continuous_active.lock().await = false;
        self.cancel.cancel();
    }

    pub async fn is_running(&self) -> bool {
        *self.is_running.lock().await
    }

    pub async fn is_stepping(&self) -> bool {
        *self.is_stepping.lock().await
    }

    pub async fn results(&self) -> Vec<StepResult> {
        self.results.lock().await.clone()
    }

    /// The flow model currently armed for continuous re-running, if any.
    /// Lets a host UI show "what's currently looping" independent of the
    /// `flow` reference it happens to hold locally.
    pub async fn current_continuous_flow(&self) -> Option<Flow> {
        self.continuous_flow.lock().await.clone()
    }

    /// Runs `flow` to completion (or until stopped). Rejects synchronously
    /// if a run or step is already active. `continuous = true` re-arms
    /// itself after completion with the configured inter-iteration delay.
    pub async fn run(&self, flow: Flow, continuous: bool) -> Result<(), FlowError> {
        if *self.is_running.lock().await || *self.is_stepping.lock().await {
            return Err(FlowError::Model("interpreter is already active".to_string()));
        }

        if continuous {
            *self.continuous_active.lock().await = true;
            *self.continuous_flow.lock().await = Some(flow.clone());
        }

        loop {
            *self.is_running.lock().await = true;
            *self.stop_requested.lock().await = false;

            {
                let mut iteration = self.iteration.lock().await;
                *iteration += 1;
                self.callbacks.on_iteration_start(*iteration);
            }

            self.seed_root_frame(&flow).await;
            self.execute_current_level().await;

            *self.is_running.lock().await = false;

            let stopped = *self.stop_requested.lock().await;
            if stopped {
                let results = self.results.lock().await.clone();
                self.callbacks.on_flow_stopped(&results);
                return Ok(());
            }

            let results = self.results.lock().await.clone();
            self.callbacks.on_flow_complete(&results);

            if !*self.continuous_active.lock().await {
                return Ok(());
            }

            if self.limits.inter_iteration_delay > Duration::ZERO
                && !self.sleep_cancellable(self.limits.inter_iteration_delay).await
            {
                return Ok(());
            }
            self.results.lock().await.clear();
        }
    }

    /// Executes exactly one step, lazily initializing the frame stack on
    /// first call. Returns `true` if a step ran, `false` if the flow was
    /// already exhausted.
    pub async fn step(&self, flow: &Flow) -> Result<bool, FlowError> {
        if *self.is_running.lock().await || *self.is_stepping.lock().await {
            return Err(FlowError::Model("interpreter is already active".to_string()));
        }

        {
            let mut frames = self.frames.lock().await;
            if frames.is_empty() {
                drop(frames);
                self.seed_root_frame(flow).await;
                frames = self.frames.lock().await;
                if frames.is_empty() {
                    return Ok(false);
                }
            }
        }

        *self.is_stepping.lock().await = true;
        *self.stop_requested.lock().await = false;
        let advanced = self.execute_next_step().await;
        *self.is_stepping.lock().await = false;

        if self.frames.lock().await.is_empty() {
            let results = self.results.lock().await.clone();
            self.callbacks.on_flow_complete(&results);
        }

        Ok(advanced)
    }

    async fn seed_root_frame(&self, flow: &Flow) {
        let context = RuntimeContext::seeded(&flow.static_vars);
        let mut frames = self.frames.lock().await;
        frames.clear();
        frames.push(ExecutionFrame::root(flow.steps.clone(), context));
        drop(frames);
        self.results.lock().await.clear();
    }

    fn current_path(&self, frames: &[ExecutionFrame]) -> Vec<String> {
        frames
            .iter()
            .filter_map(|f| f.parent_step_id.clone())
            .collect()
    }

    /// Drains frames until the stack empties or a stop is requested.
    async fn execute_current_level(&self) {
        loop {
            if *self.stop_requested.lock().await {
                return;
            }
            if self.frames.lock().await.is_empty() {
                return;
            }
            let ran = self.execute_next_step().await;
            if !ran {
                return;
            }
        }
    }

    /// Executes the step at the top frame's cursor, or pops/advances frames
    /// as needed. Returns `false` only once the whole stack is exhausted.
    async fn execute_next_step(&self) -> bool {
        loop {
            if *self.stop_requested.lock().await {
                return false;
            }

            let exhausted = {
                let frames = self.frames.lock().await;
                match frames.last() {
                    None => return false,
                    Some(frame) => frame.is_exhausted(),
                }
            };

            if exhausted {
                if !self.pop_or_advance_loop().await {
                    continue;
                }
                if self.frames.lock().await.is_empty() {
                    return false;
                }
                continue;
            }

            let step = {
                let frames = self.frames.lock().await;
                frames.last().and_then(|f| f.current_step()).cloned()
            };
            let Some(step) = step else { return false };

            let path = {
                let frames = self.frames.lock().await;
                self.current_path(&frames)
            };

            let owner = self.frames.lock().await.len() - 1;

            self.callbacks.on_step_start(&step, &path);
            let result = self.execute_step(&step).await;

            let should_stop = matches!(result.status, Some(StepStatus::Error));

            {
                let mut frames = self.frames.lock().await;
                if let Some(frame) = frames.get_mut(owner) {
                    frame.index += 1;
                }
            }

            let context_snapshot = {
                let frames = self.frames.lock().await;
                frames.last().map(|f| f.context.clone()).unwrap_or_default()
            };
            self.callbacks.on_step_complete(&result, &step, &context_snapshot, &path);
            self.results.lock().await.push(result);

            if should_stop {
                *self.stop_requested.lock().await = true;
                return false;
            }

            let has_more_siblings = {
                let frames = self.frames.lock().await;
                frames.last().map(|f| !f.is_exhausted()).unwrap_or(false)
            };
            if has_more_siblings && self.limits.inter_step_delay > Duration::ZERO {
                if !self.sleep_cancellable(self.limits.inter_step_delay).await {
                    return false;
                }
            }

            return true;
        }
    }

    /// Pops the exhausted top frame unless it is a loop frame with more
    /// iterations remaining, in which case it advances to the next
    /// iteration in place. Returns `false` if it only advanced an
    /// iteration (caller should re-check exhaustion), `true` if it
    /// actually popped (or there was nothing to pop).
    async fn pop_or_advance_loop(&self) -> bool {
        let mut frames = self.frames.lock().await;
        let Some(frame) = frames.last_mut() else { return true };

        if frame.kind == FrameKind::Loop {
            if let Some(items) = &frame.loop_items {
                let next_index = frame.loop_item_index + 1;
                if next_index < items.len() {
                    frame.loop_item_index = next_index;
                    frame.index = 0;
                    let item = items[next_index].clone();
                    if let Some(var_name) = frame.loop_var_name.clone() {
                        frame.context.set(var_name, item.clone());
                    }
                    let iteration_count = items.len();
                    drop(frames);

                    if self.limits.inter_iteration_delay > Duration::ZERO
                        && !self.sleep_cancellable(self.limits.inter_iteration_delay).await
                    {
                        return true;
                    }

                    self.callbacks.on_marker(&Marker {
                        label: "Loop Iteration".to_string(),
                        detail: Some(format!("{}/{}", next_index + 1, iteration_count)),
                    });
                    self.callbacks.on_context_update(&self.frames.lock().await.last().unwrap().context);
                    return false;
                }
            }
            drop(frames);
            self.callbacks.on_marker(&Marker {
                label: "Loop End".to_string(),
                detail: None,
            });
            self.frames.lock().await.pop();
            return true;
        }

        frames.pop();
        true
    }

    /// Sleeps for `duration`, racing the cancellation token. Returns
    /// `false` if cancelled mid-sleep (caller should treat this as a stop).
    async fn sleep_cancellable(&self, duration: Duration) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(duration) => !*self.stop_requested.lock().await,
            _ = self.cancel.cancelled() => false,
        }
    }

    async fn execute_step(&self, step: &Step) -> StepResult {
        match step {
            Step::Request { id, .. } => self.execute_request_step(id, step).await,
            Step::Condition {
                id,
                condition_data,
                then_steps,
                else_steps,
                ..
            } => {
                self.execute_condition_step(id, condition_data, then_steps, else_steps)
                    .await
            }
            Step::Loop {
                id,
                source,
                loop_variable,
                loop_steps,
                ..
            } => self.execute_loop_step(id, source, loop_variable, loop_steps).await,
        }
    }

    async fn context_value(&self) -> Value {
        self.frames
            .lock()
            .await
            .last()
            .map(|f| f.context.as_value())
            .unwrap_or(Value::Object(Default::default()))
    }

    async fn execute_request_step(&self, id: &str, step: &Step) -> StepResult {
        let Step::Request {
            method,
            url,
            headers,
            raw_body_with_markers,
            extract,
            on_failure,
            ..
        } = step
        else {
            unreachable!("caller only passes Request steps here")
        };

        let mut result = StepResult::new(id);
        let context = self.context_value().await;

        let resolved_url = substitution::substitute_string(&context, url);
        let resolved_headers = substitution::substitute_headers(&context, headers);

        let substituted = substitution::substitute_body(&context, raw_body_with_markers);
        let has_body = !raw_body_with_markers.is_null() && method_permits_body(method);

        let content_type = resolved_headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case("content-type"))
            .map(|(_, v)| v.clone())
            .unwrap_or_else(|| "application/json".to_string());

        let body_bytes = if has_body {
            let stringified = match serde_json::to_string(&substituted.processed) {
                Ok(s) => s,
                Err(e) => {
                    result.status = Some(StepStatus::Error);
                    result.error = Some(format!("failed to stringify request body: {e}"));
                    self.stop_after_failure().await;
                    return result;
                }
            };
            let spliced =
                substitution::splice_unquoted_placeholders(&stringified, &substituted.unquoted_placeholders);

            if content_type.contains("application/json") {
                if let Err(e) = serde_json::from_str::<Value>(&spliced) {
                    result.status = Some(StepStatus::Error);
                    result.error = Some(format!("substituted request body is not valid JSON: {e}"));
                    self.stop_after_failure().await;
                    return result;
                }
            }
            Some(spliced)
        } else {
            None
        };

        let method = match method.parse::<reqwest::Method>() {
            Ok(m) => m,
            Err(_) => {
                result.status = Some(StepStatus::Error);
                result.error = Some(format!("unrecognized HTTP method '{method}'"));
                self.stop_after_failure().await;
                return result;
            }
        };

        let mut request_builder = self.client.request(method, &resolved_url).timeout(self.limits.request_timeout);
        for (name, value) in &resolved_headers {
            request_builder = request_builder.header(name, value);
        }
        if let Some(body) = body_bytes {
            if !resolved_headers.keys().any(|k| k.eq_ignore_ascii_case("content-type")) {
                request_builder = request_builder.header("content-type", &content_type);
            }
            request_builder = request_builder.body(body);
        }

        let send_future = request_builder.send();
        tokio::select! {
            response = send_future => {
                match response {
                    Ok(resp) => self.finish_request_step(id, resp, extract, *on_failure).await,
                    Err(e) => {
                        let reason = if e.is_timeout() {
                            RequestFailureReason::Timeout
                        } else {
                            RequestFailureReason::Network
                        };
                        let mut result = StepResult::new(id);
                        result.status = Some(StepStatus::Error);
                        result.error = Some(reason.message(&e.to_string()));
                        if matches!(on_failure, crate::model::OnFailure::Stop) {
                            self.stop_after_failure().await;
                        }
                        result
                    }
                }
            }
            _ = self.cancel.cancelled() => {
                let mut result = StepResult::new(id);
                result.status = Some(StepStatus::Stopped);
                result.error = Some(RequestFailureReason::UserStopped.message(""));
                result
            }
        }
    }

    async fn finish_request_step(
        &self,
        id: &str,
        response: reqwest::Response,
        extract: &HashMap<String, String>,
        on_failure: crate::model::OnFailure,
    ) -> StepResult {
        let mut result = StepResult::new(id);
        let status = response.status().as_u16();
        let resp_content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        let headers_map: HashMap<String, String> = response
            .headers()
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_str().unwrap_or("").to_string()))
            .collect();

        let text = match response.text().await {
            Ok(t) => t,
            Err(e) => {
                result.status = Some(StepStatus::Error);
                result.error = Some(format!("failed to read response body: {e}"));
                if matches!(on_failure, crate::model::OnFailure::Stop) {
                    self.stop_after_failure().await;
                }
                return result;
            }
        };

        let body_value = if resp_content_type.contains("application/json") {
            serde_json::from_str::<Value>(&text).unwrap_or(Value::String(text.clone()))
        } else {
            Value::String(text)
        };

        let output = serde_json::json!({
            "status": status,
            "headers": headers_map,
            "body": body_value,
        });
        result.output = Some(output.clone());

        let is_success = (200..300).contains(&status);
        result.status = Some(StepStatus::Success);
        if !is_success && matches!(on_failure, crate::model::OnFailure::Stop) {
            result.status = Some(StepStatus::Error);
            result.error = Some(format!("request returned non-2xx status {status}"));
        }

        let mut frames = self.frames.lock().await;
        if let Some(frame) = frames.last_mut() {
            let ExtractionOutcome {
                extracted_values,
                failures,
                changed,
            } = extraction::apply_extractions(&mut frame.context, extract, &output);
            result.extracted_values = extracted_values;
            result.extraction_failures = failures;
            if changed {
                self.callbacks.on_context_update(&frame.context);
            }
        }
        drop(frames);

        if matches!(result.status, Some(StepStatus::Error)) && !is_success {
            self.callbacks.on_error(&FlowError::Request(format!(
                "request step '{id}' failed with status {status}"
            )));
        }

        result
    }

    async fn stop_after_failure(&self) {
        *self.stop_requested.lock().await = true;
    }

    async fn execute_condition_step(
        &self,
        id: &str,
        condition_data: &crate::model::ConditionData,
        then_steps: &[Step],
        else_steps: &[Step],
    ) -> StepResult {
        let mut result = StepResult::new(id);
        let context = self.context_value().await;

        let evaluated = condition::evaluate(
            &context,
            &condition_data.variable,
            &condition_data.operator,
            &condition_data.value,
        );

        match evaluated {
            Ok(is_true) => {
                result.status = Some(StepStatus::Success);
                result.output = Some(Value::Bool(is_true));

                let branch_name = if is_true { "Then" } else { "Else" };
                self.callbacks.on_marker(&Marker {
                    label: "Condition Result".to_string(),
                    detail: Some(branch_name.to_string()),
                });

                let branch_steps = if is_true { then_steps } else { else_steps }.to_vec();
                let frame_context = {
                    let frames = self.frames.lock().await;
                    frames.last().map(|f| f.context.fork()).unwrap_or_default()
                };
                let mut frame = ExecutionFrame::root(branch_steps, frame_context);
                frame.kind = if is_true { FrameKind::Then } else { FrameKind::Else };
                frame.parent_step_id = Some(id.to_string());
                self.frames.lock().await.push(frame);
            }
            Err(e) => {
                result.status = Some(StepStatus::Error);
                result.error = Some(e.to_string());
                self.callbacks.on_error(&e);
            }
        }

        result
    }

    async fn execute_loop_step(
        &self,
        id: &str,
        source: &str,
        loop_variable: &str,
        loop_steps: &[Step],
    ) -> StepResult {
        let mut result = StepResult::new(id);
        let context = self.context_value().await;

        let stripped = source.trim().trim_start_matches("{{").trim_end_matches("}}").trim();
        let resolved = crate::path::evaluate(&context, stripped);

        let items = match resolved {
            None => {
                self.callbacks
                    .on_message(&format!("loop source '{source}' did not resolve; treating as empty"));
                Vec::new()
            }
            Some(Value::Array(items)) => items,
            Some(_) => {
                result.status = Some(StepStatus::Error);
                result.error = Some(format!("loop source '{source}' did not resolve to an array"));
                self.callbacks.on_error(&FlowError::Loop(result.error.clone().unwrap()));
                self.stop_after_failure().await;
                return result;
            }
        };

        result.status = Some(StepStatus::Success);
        result.output = Some(Value::Number(items.len().into()));
        self.callbacks.on_marker(&Marker {
            label: "Loop Start".to_string(),
            detail: Some(format!("{} item(s)", items.len())),
        });

        if items.is_empty() {
            return result;
        }

        let iteration_count = items.len();
        let mut frame_context = {
            let frames = self.frames.lock().await;
            frames.last().map(|f| f.context.fork()).unwrap_or_default()
        };
        frame_context.set(loop_variable, items[0].clone());

        let mut frame = ExecutionFrame::root(loop_steps.to_vec(), frame_context);
        frame.kind = FrameKind::Loop;
        frame.parent_step_id = Some(id.to_string());
        frame.loop_items = Some(items);
        frame.loop_item_index = 0;
        frame.loop_var_name = Some(loop_variable.to_string());
        self.frames.lock().await.push(frame);

        self.callbacks.on_marker(&Marker {
            label: "Loop Iteration".to_string(),
            detail: Some(format!("1/{iteration_count}")),
        });
        self.callbacks.on_context_update(&self.frames.lock().await.last().unwrap().context);

        result
    }
}

fn method_permits_body(method: &str) -> bool {
    !matches!(method.to_ascii_uppercase().as_str(), "GET" | "HEAD")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ConditionData, OnFailure};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn request_step(id: &str, url: &str, on_failure: OnFailure) -> Step {
        Step::Request {
            id: id.to_string(),
            name: id.to_string(),
            method: "GET".to_string(),
            url: url.to_string(),
            headers: HashMap::new(),
            raw_body_with_markers: Value::Null,
            body: String::new(),
            extract: HashMap::new(),
            on_failure,
        }
    }

    #[derive(Default)]
    struct CountingCallbacks {
        starts: AtomicUsize,
        completes: AtomicUsize,
    }

    impl RunnerCallbacks for CountingCallbacks {
        fn on_step_start(&self, _step: &Step, _path: &[String]) {
            self.starts.fetch_add(1, Ordering::SeqCst);
        }
        fn on_step_complete(&self, _result: &StepResult, _step: &Step, _context: &RuntimeContext, _path: &[String]) {
            self.completes.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn condition_step_pushes_then_branch_and_continues() {
        let callbacks = Arc::new(CountingCallbacks::default());
        let runner = FlowRunner::new(RunnerLimits::default(), callbacks.clone());

        let flow = Flow {
            name: "demo".to_string(),
            static_vars: {
                let mut m = HashMap::new();
                m.insert("flag".to_string(), json!(true));
                m
            },
            steps: vec![Step::Condition {
                id: "c1".to_string(),
                name: "c1".to_string(),
                condition: None,
                condition_data: ConditionData {
                    variable: "flag".to_string(),
                    operator: "is_true".to_string(),
                    value: Value::Null,
                    preview: None,
                },
                then_steps: vec![],
                else_steps: vec![],
            }],
            ..Default::default()
        };

        runner.run(flow, false).await.unwrap();
        let results = runner.results().await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].status, Some(StepStatus::Success));
        assert_eq!(results[0].output, Some(Value::Bool(true)));
    }

    #[tokio::test]
    async fn loop_with_empty_array_emits_start_and_no_iterations() {
        let callbacks = Arc::new(NoopCallbacks);
        let runner = FlowRunner::new(RunnerLimits::default(), callbacks);

        let flow = Flow {
            name: "demo".to_string(),
            static_vars: {
                let mut m = HashMap::new();
                m.insert("xs".to_string(), json!([]));
                m
            },
            steps: vec![Step::Loop {
                id: "l1".to_string(),
                name: "l1".to_string(),
                source: "xs".to_string(),
                loop_variable: "item".to_string(),
                loop_steps: vec![request_step("r1", "https://example.invalid", OnFailure::Continue)],
            }],
            ..Default::default()
        };

        runner.run(flow, false).await.unwrap();
        let results = runner.results().await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].status, Some(StepStatus::Success));
    }

    #[tokio::test]
    async fn loop_source_not_an_array_fails_and_stops() {
        let callbacks = Arc::new(NoopCallbacks);
        let runner = FlowRunner::new(RunnerLimits::default(), callbacks);

        let flow = Flow {
            name: "demo".to_string(),
            static_vars: {
                let mut m = HashMap::new();
                m.insert("xs".to_string(), json!("not-an-array"));
                m
            },
            steps: vec![
                Step::Loop {
                    id: "l1".to_string(),
                    name: "l1".to_string(),
                    source: "xs".to_string(),
                    loop_variable: "item".to_string(),
                    loop_steps: vec![],
                },
                request_step("after", "https://example.invalid", OnFailure::Continue),
            ],
            ..Default::default()
        };

        runner.run(flow, false).await.unwrap();
        let results = runner.results().await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].status, Some(StepStatus::Error));
    }

    #[tokio::test]
    async fn second_run_while_first_active_is_rejected() {
        let callbacks = Arc::new(NoopCallbacks);
        let runner = Arc::new(FlowRunner::new(RunnerLimits::default(), callbacks));
        *runner.is_running.lock().await = true;

        let flow = Flow {
            name: "demo".to_string(),
            ..Default::default()
        };
        let err = runner.run(flow, false).await.unwrap_err();
        assert_eq!(err.code(), "model");
    }

    #[tokio::test]
    async fn stop_marks_stop_requested_and_cancels_token() {
        let callbacks = Arc::new(NoopCallbacks);
        let runner = FlowRunner::new(RunnerLimits::default(), callbacks);
        runner.stop().await;
        assert!(*runner.stop_requested.lock().await);
        assert!(runner.cancel.is_cancelled());
    }

    fn post_step(id: &str, url: &str, raw_body_with_markers: Value, on_failure: OnFailure) -> Step {
        Step::Request {
            id: id.to_string(),
            name: id.to_string(),
            method: "POST".to_string(),
            url: url.to_string(),
            headers: HashMap::new(),
            raw_body_with_markers,
            body: String::new(),
            extract: HashMap::new(),
            on_failure,
        }
    }

    #[tokio::test]
    async fn unquoted_numeric_placeholder_is_sent_as_a_json_number() {
        use wiremock::matchers::{body_json, method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/echo"))
            .and(body_json(json!({"n": 3})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"received": true})))
            .mount(&server)
            .await;

        let callbacks = Arc::new(NoopCallbacks);
        let runner = FlowRunner::new(RunnerLimits::default(), callbacks);
        let flow = Flow {
            name: "demo".to_string(),
            static_vars: {
                let mut m = HashMap::new();
                m.insert("count".to_string(), json!(3));
                m
            },
            steps: vec![post_step(
                "r1",
                &format!("{}/echo", server.uri()),
                json!({"n": "##VAR:unquoted:count##"}),
                OnFailure::Stop,
            )],
            ..Default::default()
        };

        runner.run(flow, false).await.unwrap();
        let results = runner.results().await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].status, Some(StepStatus::Success));
        assert_eq!(
            results[0].output.as_ref().and_then(|o| o.get("body")).cloned(),
            Some(json!({"received": true}))
        );
    }

    #[tokio::test]
    async fn on_failure_continue_keeps_running_after_a_500() {
        use wiremock::matchers::method;
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_json(json!({"error": "boom"})))
            .mount(&server)
            .await;

        let callbacks = Arc::new(NoopCallbacks);
        let runner = FlowRunner::new(RunnerLimits::default(), callbacks);
        let flow = Flow {
            name: "demo".to_string(),
            steps: vec![
                post_step("r1", &server.uri(), Value::Null, OnFailure::Continue),
                post_step("r2", &server.uri(), Value::Null, OnFailure::Continue),
            ],
            ..Default::default()
        };

        runner.run(flow, false).await.unwrap();
        let results = runner.results().await;
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].status, Some(StepStatus::Success));
        assert_eq!(results[1].status, Some(StepStatus::Success));
    }

    #[tokio::test]
    async fn on_failure_stop_halts_the_flow_after_a_500() {
        use wiremock::matchers::method;
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_json(json!({"error": "boom"})))
            .mount(&server)
            .await;

        let callbacks = Arc::new(NoopCallbacks);
        let runner = FlowRunner::new(RunnerLimits::default(), callbacks);
        let flow = Flow {
            name: "demo".to_string(),
            steps: vec![
                post_step("r1", &server.uri(), Value::Null, OnFailure::Stop),
                post_step("r2", &server.uri(), Value::Null, OnFailure::Stop),
            ],
            ..Default::default()
        };

        runner.run(flow, false).await.unwrap();
        let results = runner.results().await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].status, Some(StepStatus::Error));
    }
}
