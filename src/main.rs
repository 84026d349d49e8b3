use persistent_tasks::config::{EnvVar, Opts, get_or_create_config};
use persistent_tasks::fs::init_misc_dir_or_stderr;
use persistent_tasks::global_var::LOGGER_CELL;
use persistent_tasks::utilities::AsyncLogger;
use persistent_tasks::{PersistentTaskManager, Services, TaskRegistry, TaskStore};

fn print_version_and_exit() -> ! {
    // Set by build.rs
    let pkg_version = env!("CARGO_PKG_VERSION");
    let commit = option_env!("GIT_COMMIT").unwrap_or("unknown");
    let state = option_env!("GIT_STATE").unwrap_or("unknown");
    let built = option_env!("BUILD_TIME").unwrap_or("unknown time");
    println!(
        "persistent_tasks {} (commit: {}, state: {}, built: {})",
        pkg_version, commit, state, built
    );
    std::process::exit(0)
}

async fn list_tasks(store: &TaskStore) -> i32 {
    match store.inspect().await {
        Ok(summary) if summary.is_empty() => {
            println!("No stored tasks");
            0
        }
        Ok(summary) => {
            for (i, (kind, size)) in summary.iter().enumerate() {
                println!("{:>4}  {:<32} {} bytes", i, kind, size);
            }
            0
        }
        Err(e) => {
            eprintln!("Failed to read task store: {}", e);
            1
        }
    }
}

async fn run_manager(env: &EnvVar, store: TaskStore, purge: bool, logger: &AsyncLogger) -> i32 {
    let manager = PersistentTaskManager::new(
        store,
        TaskRegistry::default(),
        Services::offline(env.is_remote_service_enabled()),
        env.manager_options(),
    );
    if let Err(e) = manager.start().await {
        logger.error(format!("Failed to start task manager: {}", e));
        return 1;
    }

    if purge {
        let count = manager.active_task_count();
        manager.purge_all_tasks().await;
        manager.shutdown().await;
        println!("Purged {} tasks", count);
        return 0;
    }

    logger.info(format!(
        "Task manager running for profile '{}' with {} tasks",
        env.get_profile_name(),
        manager.active_task_count()
    ));
    for (id, description) in manager.task_summaries() {
        logger.debug(format!("  {} {}", id, description));
    }
    if let Err(e) = tokio::signal::ctrl_c().await {
        logger.error(format!("Unable to listen for Ctrl-C: {}", e));
    }
    logger.info("Shutting down task manager");
    manager.shutdown().await;
    0
}

async fn async_main(opts: Opts) -> i32 {
    // Empty path falls through to interactive setup
    let cfg_path_opt: Option<&str> = opts
        .config
        .as_deref()
        .map(|p| p.to_str().unwrap_or(""))
        .or(Some(""));

    let config = match get_or_create_config(cfg_path_opt) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load or create configuration: {}", e);
            return 1;
        }
    };
    let env = match EnvVar::from_config(&config) {
        Ok(env) => env,
        Err(e) => {
            eprintln!("Invalid configuration: {}", e);
            return 1;
        }
    };

    let (logger, log_task) = init_misc_dir_or_stderr(env.get_misc_dir(), env.get_log_file()).await;
    let _ = LOGGER_CELL.set(logger.clone());

    let store = if log_task.is_some() {
        TaskStore::open(env.get_misc_dir(), env.get_profile_name())
    } else {
        TaskStore::detached()
    };
    let code = if opts.list_tasks {
        list_tasks(&store).await
    } else {
        run_manager(&env, store, opts.purge, &logger).await
    };

    logger.shutdown().await;
    if let Some(log_task) = log_task {
        let _ = log_task.await;
    }
    code
}

fn main() {
    let opts = Opts::from_args();

    if opts.version {
        print_version_and_exit();
    }
    if opts.debug {
        // SAFETY: no other thread exists yet.
        unsafe { std::env::set_var("DEBUG_MODE", "1") };
    }

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to start tokio runtime: {}", e);
            std::process::exit(1);
        }
    };
    let code = runtime.block_on(async_main(opts));
    std::process::exit(code);
}
