/// Rule-based replies used when no upstream model is configured. Keyword
/// groups are checked in order; the first match wins.
const ERROR_KEYWORDS: &[&str] = &["error", "traceback", "exception", "crash"];
const FIX_KEYWORDS: &[&str] = &["how do i fix", "how to fix", "fix it", "help"];
const PERF_KEYWORDS: &[&str] = &["slow", "performance", "lag"];

const ERROR_GUIDANCE: &str = "It looks like you're seeing an error. Try these steps:\n\
1) Read the full traceback to find the error type and file/line.\n\
2) Search for the exact error message. Many issues are already reported.\n\
3) Check recent changes: what code or dependency was updated?\n\
4) Reproduce with a minimal test case and add logging around the failing area.\n\
If you paste the exact error message I can give more targeted advice.";

const FIX_GUIDANCE: &str = "Here's a troubleshooting checklist:\n\
- Confirm steps to reproduce the issue and the expected behavior.\n\
- Check logs and tracebacks (server and client).\n\
- Isolate the failure to a single component (frontend/backend/db).\n\
- Try rolling back recent changes or run in a clean environment.\n\
- If it's an import/module error, ensure dependencies are installed.\n\
If you give me the error text or the command you ran I can suggest exact commands.";

const PERF_GUIDANCE: &str = "Performance troubleshooting suggestions:\n\
- Measure where time is spent (profilers for backend, devtools for frontend).\n\
- Check database query times and add indexes where needed.\n\
- Cache expensive computations and use pagination for large lists.\n\
- For model-backed features, batch requests where possible.";

pub fn mock_reply(prompt: &str) -> String {
    let low = prompt.to_lowercase();
    let matches = |keywords: &[&str]| keywords.iter().any(|keyword| low.contains(keyword));
    if matches(ERROR_KEYWORDS) {
        return ERROR_GUIDANCE.to_string();
    }
    if matches(FIX_KEYWORDS) {
        return FIX_GUIDANCE.to_string();
    }
    if matches(PERF_KEYWORDS) {
        return PERF_GUIDANCE.to_string();
    }
    format!(
        "I can help troubleshoot. Here are a few starter steps:\n\
1) Share the exact command or action that caused the issue.\n\
2) Copy the full error or describe the unexpected behavior.\n\
3) Tell me what you have already tried.\n\n\
You asked: {prompt}\n\n\
If you paste the error text or logs I will give prioritized steps to fix it."
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_keywords_take_priority() {
        let reply = mock_reply("Help, I get a Traceback on startup");
        assert!(reply.starts_with("It looks like you're seeing an error"));
    }

    #[test]
    fn fix_and_performance_groups() {
        assert!(mock_reply("how do I fix the build").starts_with("Here's a troubleshooting"));
        assert!(mock_reply("the dashboard is slow").starts_with("Performance"));
    }

    #[test]
    fn generic_reply_echoes_prompt() {
        let reply = mock_reply("hello");
        assert!(reply.contains("You asked: hello"));
    }
}
