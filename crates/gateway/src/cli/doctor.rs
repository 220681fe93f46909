use dw_domain::config::{Config, ConfigSeverity};

/// Run all diagnostic checks and print a summary.
///
/// Returns `Ok(true)` when every check passes, `Ok(false)` when at least
/// one check failed.
pub fn run(config: &Config, config_path: &str) -> anyhow::Result<bool> {
    println!("dwgateway doctor");
    println!("================\n");

    let mut all_passed = true;

    check_config_file(config_path, &mut all_passed);
    check_config_validation(config, &mut all_passed);
    check_llm_providers(config, &mut all_passed);
    check_storage_root(config, &mut all_passed);
    check_documents_root(config, &mut all_passed);

    println!();
    if all_passed {
        println!("All checks passed.");
    } else {
        println!("Some checks failed. Review the output above.");
    }

    Ok(all_passed)
}

fn check_config_file(config_path: &str, all_passed: &mut bool) {
    let exists = std::path::Path::new(config_path).exists();
    print_check(
        "Config file exists",
        exists,
        if exists {
            config_path.to_owned()
        } else {
            format!("{config_path} not found (using defaults)")
        },
    );
    if !exists {
        *all_passed = false;
    }
}

fn check_config_validation(config: &Config, all_passed: &mut bool) {
    let issues = config.validate();
    let error_count = issues
        .iter()
        .filter(|e| e.severity == ConfigSeverity::Error)
        .count();

    if issues.is_empty() {
        print_check("Config validation", true, "no issues".into());
    } else {
        print_check(
            "Config validation",
            error_count == 0,
            format!("{} issue(s) ({} error(s))", issues.len(), error_count),
        );
        for issue in &issues {
            println!("      {issue}");
        }
        if error_count > 0 {
            *all_passed = false;
        }
    }
}

fn check_llm_providers(config: &Config, all_passed: &mut bool) {
    let count = config.llm.providers.len();
    let ok = count > 0;
    print_check(
        "LLM providers configured",
        ok,
        if ok {
            format!("{count} provider(s)")
        } else {
            "none configured".into()
        },
    );
    if !ok {
        *all_passed = false;
    }
}

fn check_storage_root(config: &Config, all_passed: &mut bool) {
    let path = &config.storage.root;
    let ok = std::fs::create_dir_all(path).is_ok();
    print_check(
        "Storage root writable",
        ok,
        format!("{}", path.display()),
    );
    if !ok {
        *all_passed = false;
    }
}

fn check_documents_root(config: &Config, all_passed: &mut bool) {
    let path = &config.tools.documents_root;
    let exists = path.exists();
    print_check(
        "Documents root exists",
        exists,
        if exists {
            format!("{}", path.display())
        } else {
            format!("{} (not found)", path.display())
        },
    );
    if !exists {
        *all_passed = false;
    }
}

fn print_check(name: &str, passed: bool, detail: String) {
    let status = if passed { "PASS" } else { "FAIL" };
    println!("  [{status}] {name}: {detail}");
}
