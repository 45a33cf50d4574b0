//! 回放工具入口
//!
//! 解析命令行参数，按批次读取查询日志并回放，最后输出测量报表。
//! 只有 IO 类失败（日志不可读、结果不可写）会终止进程。

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use mysql_database_replay_querylog::{
    BenchMonitor, LogEventParser, NullDriver, ReplayConfig, ReplayEngine, ReplayError,
    ReportFormat, SqlDriver, SqliteDriver,
};

/// MySQL 查询日志回放基准测试工具
#[derive(Parser, Debug)]
#[command(name = "mysql-replay", version, about)]
struct Args {
    /// 查询日志文件
    #[arg(short = 'i', long)]
    input: PathBuf,

    /// 结果文件；缺省打印到标准输出
    #[arg(short = 'r', long)]
    result: Option<PathBuf>,

    /// 服务器地址（sqlite 驱动：数据库文件所在目录，`:memory:` 为内存库）
    #[arg(short = 's', long, default_value = ":memory:")]
    server: String,

    /// 默认数据库名
    #[arg(short = 'd', long, default_value = "test")]
    database: String,

    /// 数据库用户名
    #[arg(short = 'u', long, default_value = "")]
    username: String,

    /// 数据库密码
    #[arg(short = 'p', long, default_value = "")]
    password: String,

    /// 并发上限 P
    #[arg(long, default_value_t = 15)]
    parallel: usize,

    /// 单个批次消费的日志行数
    #[arg(long, default_value_t = 10_000)]
    batch: usize,

    /// 忽略前缀：以此开头的语句不回放（可重复）
    #[arg(long = "ignore-prefix")]
    ignore_prefixes: Vec<String>,

    /// 排除的连接 id（例如抓取日志的会话自身）
    #[arg(long = "connection-id")]
    restricted_id: Option<String>,

    /// 报表格式：text 或 csv
    #[arg(short = 'f', long, default_value = "text")]
    format: String,

    /// 空跑：不连接数据库，只验证解析与调度
    #[arg(long)]
    dry_run: bool,

    /// 把报表同时写入日志
    #[arg(short = 'v', long)]
    verbose: bool,
}

fn main() {
    env_logger::init();
    let args = Args::parse();
    if let Err(err) = run(args) {
        log::error!("{err}");
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<(), ReplayError> {
    let config = ReplayConfig {
        server: args.server.clone(),
        database: args.database.clone(),
        username: args.username.clone(),
        password: args.password.clone(),
        parallel: args.parallel,
        batch_size: args.batch,
        ignore_prefixes: args.ignore_prefixes.clone(),
        restricted_id: args.restricted_id.clone(),
        format: ReportFormat::get(&args.format),
        ..ReplayConfig::default()
    };

    let driver: Arc<dyn SqlDriver> = if args.dry_run {
        Arc::new(NullDriver)
    } else {
        Arc::new(SqliteDriver)
    };
    let monitor = Arc::new(BenchMonitor::new());

    let mut parser = LogEventParser::from_path(&args.input)?
        .with_ignore_prefixes(config.ignore_prefixes.clone());
    if let Some(id) = &config.restricted_id {
        parser = parser.with_restricted_id(id.clone());
    }

    // 覆盖整次运行的聚合测量点
    let run_point = monitor.start_point("Measurement");

    let mut events = Vec::new();
    let mut batch_index = 0usize;
    loop {
        events.clear();
        let filled = parser.parse_batch(config.batch_size, &mut events)?;

        if !events.is_empty() {
            batch_index += 1;
            log::info!(
                "read {} events from '{}' (batch {})",
                events.len(),
                args.input.display(),
                batch_index
            );

            // 每个批次一个引擎：注册表不跨批次存活
            let engine = ReplayEngine::new(
                config.clone(),
                Arc::clone(&driver),
                Arc::clone(&monitor),
            );
            for event in events.drain(..) {
                engine.dispatch(event);
            }
            engine.join()?;
            log::info!("batch {} completed", batch_index);
        }

        if !filled {
            break;
        }
    }

    let dropped = parser.take_parse_errors();
    if !dropped.is_empty() {
        log::info!("{} lines dropped by filters or parse errors", dropped.len());
        for err in &dropped {
            log::debug!("dropped: {err}");
        }
    }

    run_point.collect();
    let report = monitor.render(config.format);
    if args.verbose {
        log::info!("\n{report}");
    }

    match &args.result {
        Some(path) => {
            fs::write(path, &report)
                .map_err(|e| ReplayError::Io(format!("{}: {}", path.display(), e)))?;
            log::info!("result written to {}", path.display());
        }
        None => print!("{report}"),
    }
    Ok(())
}
