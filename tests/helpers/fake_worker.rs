//! Scripted fake workers.
//!
//! Each worker is a small shell script written to a tempdir and run via
//! `/bin/sh`, speaking the line-JSON protocol on stdin/stdout. The scripts
//! extract the request id with `sed` and branch on the request type, which is
//! enough to exercise every supervisor path without a real engine.

use tempfile::TempDir;

/// Write `body` as a script into `dir` and return the command line to run it.
pub fn script_command(dir: &TempDir, name: &str, body: &str) -> Vec<String> {
    let path = dir.path().join(name);
    std::fs::write(&path, body).expect("failed to write fake worker script");
    vec![
        "/bin/sh".to_string(),
        path.to_string_lossy().into_owned(),
    ]
}

/// A well-behaved worker: announces readiness, then answers every request.
///
/// Request types understood:
/// - `check_imports` → `{"ok": true, "missing": []}`
/// - `streamfail`    → one chunk, then a terminal error
/// - `stream`        → `"Hel"`, `"lo"`, then `"Hello"`
/// - `slow`          → never answered
/// - `die`           → the worker exits with code 7
/// - `late`          → answered after 1 s (for expired-timeout tests)
/// - `env`           → echoes `$SIDECAR_TEST_SECRET` (or `unset`)
/// - anything else   → `{"status": "ok"}` (includes `ping`)
pub const ECHO_WORKER: &str = r#"
printf '{"id":0,"result":{"status":"ready"}}\n'
while IFS= read -r line; do
    id=$(printf '%s' "$line" | sed -n 's/.*"id":\([0-9]*\).*/\1/p')
    case "$line" in
        *'"type":"check_imports"'*)
            printf '{"id":%s,"result":{"ok":true,"missing":[]},"error":null}\n' "$id" ;;
        *'"type":"streamfail"'*)
            printf '{"id":%s,"chunk":"part"}\n' "$id"
            printf '{"id":%s,"error":"generation failed"}\n' "$id" ;;
        *'"type":"stream"'*)
            printf '{"id":%s,"chunk":"Hel"}\n' "$id"
            printf '{"id":%s,"chunk":"lo"}\n' "$id"
            printf '{"id":%s,"result":"Hello"}\n' "$id" ;;
        *'"type":"slow"'*)
            : ;;
        *'"type":"die"'*)
            exit 7 ;;
        *'"type":"late"'*)
            ( sleep 1; printf '{"id":%s,"result":"late"}\n' "$id" ) & ;;
        *'"type":"env"'*)
            printf '{"id":%s,"result":"%s"}\n' "$id" "${SIDECAR_TEST_SECRET:-unset}" ;;
        *)
            printf '{"id":%s,"result":{"status":"ok"},"error":null}\n' "$id" ;;
    esac
done
"#;

/// Announces readiness, then goes silent forever: alive per the OS, wedged
/// per the protocol. Exercises the heartbeat kill path.
pub const SILENT_WORKER: &str = r#"
printf '{"id":0,"result":{"status":"ready"}}\n'
exec cat > /dev/null
"#;

/// Exits immediately without ever becoming ready. Exercises the
/// backoff/retry-exhaustion path.
pub const DYING_WORKER: &str = r#"
exit 1
"#;

/// Silent on the first run, well-behaved afterwards. `$1` is a marker file
/// recording that the first generation already happened.
pub const SILENT_THEN_HEALTHY_WORKER: &str = r#"
if [ -f "$1" ]; then
    printf '{"id":0,"result":{"status":"ready"}}\n'
    while IFS= read -r line; do
        id=$(printf '%s' "$line" | sed -n 's/.*"id":\([0-9]*\).*/\1/p')
        case "$line" in
            *'"type":"die"'*) exit 7 ;;
            *) printf '{"id":%s,"result":{"status":"ok"}}\n' "$id" ;;
        esac
    done
else
    touch "$1"
    printf '{"id":0,"result":{"status":"ready"}}\n'
    exec cat > /dev/null
fi
"#;
