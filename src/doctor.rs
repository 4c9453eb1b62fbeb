use mangaba_core::config::{validate_api_key, AppConfig, FailurePolicy, ToolBackend};

struct CheckResult {
    label: String,
    ok: bool,
    detail: String,
}

pub fn run_doctor(config: &AppConfig) {
    let checks = vec![
        // 1. Model provider supported
        check_provider(config),
        // 2. Credential usable
        check_api_key(config),
        // 3. Tool backend reachable in principle
        check_tools(config),
        // 4. Executor options sane
        check_executor(config),
        // 5. Run log directory writable
        check_log_dir(config),
    ];

    let mut ok_count = 0;
    let mut fail_count = 0;

    for check in &checks {
        let icon = if check.ok { "[OK]" } else { "[!!]" };
        println!("  {} {}: {}", icon, check.label, check.detail);
        if check.ok {
            ok_count += 1;
        } else {
            fail_count += 1;
        }
    }

    println!();
    println!("  {} passed, {} issues found", ok_count, fail_count);
}

fn check_provider(config: &AppConfig) -> CheckResult {
    let provider = config.model.provider.as_str();
    let ok = matches!(provider, "gemini" | "google");
    CheckResult {
        label: "Model provider".into(),
        ok,
        detail: if ok {
            format!("{} ({})", config.model.model_id, provider)
        } else {
            format!("Unsupported provider '{}'", provider)
        },
    }
}

fn check_api_key(config: &AppConfig) -> CheckResult {
    let raw = config
        .model
        .api_key
        .clone()
        .or_else(|| std::env::var(&config.model.api_key_env).ok());

    match raw.as_deref().map(validate_api_key) {
        Some(Ok(_)) => CheckResult {
            label: "API Key".into(),
            ok: true,
            detail: "Configured".into(),
        },
        Some(Err(e)) => CheckResult {
            label: "API Key".into(),
            ok: false,
            detail: e.to_string(),
        },
        None => CheckResult {
            label: "API Key".into(),
            ok: false,
            detail: format!(
                "Not set (add model.api_key or export {}); AI nodes will be refused",
                config.model.api_key_env
            ),
        },
    }
}

fn check_tools(config: &AppConfig) -> CheckResult {
    match (config.tools.backend, config.tools.endpoint.as_deref()) {
        (ToolBackend::Mock, _) => CheckResult {
            label: "Tools".into(),
            ok: true,
            detail: "Mock backend".into(),
        },
        (ToolBackend::Remote, Some(url))
            if url.starts_with("http://") || url.starts_with("https://") =>
        {
            CheckResult {
                label: "Tools".into(),
                ok: true,
                detail: format!("Remote backend at {}", url),
            }
        }
        (ToolBackend::Remote, Some(url)) => CheckResult {
            label: "Tools".into(),
            ok: false,
            detail: format!("Endpoint '{}' is not an http(s) URL", url),
        },
        (ToolBackend::Remote, None) => CheckResult {
            label: "Tools".into(),
            ok: false,
            detail: "Remote backend selected but tools.endpoint is not set".into(),
        },
    }
}

fn check_executor(config: &AppConfig) -> CheckResult {
    let policy = match config.executor.failure_policy {
        FailurePolicy::AbortRun => "abort_run",
        FailurePolicy::IsolateBranch => "isolate_branch",
    };
    let limit = match config.executor.max_visits_per_node {
        0 => "no visit limit (cyclic flows never terminate)".to_string(),
        n => format!("visit limit {}", n),
    };
    CheckResult {
        label: "Executor".into(),
        ok: true,
        detail: format!("{}, {}", policy, limit),
    }
}

fn check_log_dir(config: &AppConfig) -> CheckResult {
    let Some(log) = config.log.as_ref().filter(|l| l.enabled) else {
        return CheckResult {
            label: "Run log".into(),
            ok: true,
            detail: "Disabled".into(),
        };
    };

    let dir = log.dir();
    if let Err(e) = std::fs::create_dir_all(&dir) {
        return CheckResult {
            label: "Run log".into(),
            ok: false,
            detail: format!("{} (cannot create: {})", dir.display(), e),
        };
    }
    let test_file = dir.join(".doctor_test");
    match std::fs::write(&test_file, "test") {
        Ok(_) => {
            std::fs::remove_file(&test_file).ok();
            CheckResult {
                label: "Run log".into(),
                ok: true,
                detail: format!("{}", dir.display()),
            }
        }
        Err(e) => CheckResult {
            label: "Run log".into(),
            ok: false,
            detail: format!("{} (not writable: {})", dir.display(), e),
        },
    }
}
