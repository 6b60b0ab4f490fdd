use anyhow::{Context, Result};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use serde::Serialize;
use tasktree::Application;
use tasktree_core::{init_logging, AppConfig};
use tasktree_domain::{NewTask, TaskId, TenantId, TreeScope, UserId};
use tracing::{info, warn};

fn cli() -> Command {
    let tenant = Arg::new("tenant")
        .long("tenant")
        .value_name("UUID")
        .help("租户ID");
    let project = Arg::new("project")
        .long("project")
        .value_name("UUID")
        .help("项目ID（即根任务ID）")
        .required(true);

    Command::new("tasktree")
        .version("1.0.0")
        .about("任务树引擎")
        .subcommand_required(true)
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("配置文件路径")
                .global(true),
        )
        .arg(
            Arg::new("log-level")
                .short('l')
                .long("log-level")
                .value_name("LEVEL")
                .help("日志级别")
                .value_parser(["trace", "debug", "info", "warn", "error"])
                .global(true),
        )
        .arg(
            Arg::new("log-format")
                .long("log-format")
                .value_name("FORMAT")
                .help("日志格式")
                .value_parser(["json", "pretty", "text"])
                .global(true),
        )
        .subcommand(Command::new("migrate").about("创建或升级数据库表结构"))
        .subcommand(
            Command::new("create-project")
                .about("创建项目及其根任务")
                .arg(tenant.clone().help("租户ID，缺省时生成新的租户"))
                .arg(
                    Arg::new("name")
                        .long("name")
                        .value_name("NAME")
                        .help("项目名称")
                        .required(true),
                )
                .arg(
                    Arg::new("description")
                        .long("description")
                        .value_name("TEXT")
                        .default_value(""),
                )
                .arg(
                    Arg::new("parallel")
                        .long("parallel")
                        .help("子任务并行执行")
                        .action(ArgAction::SetTrue),
                )
                .arg(
                    Arg::new("time-estimate")
                        .long("time-estimate")
                        .value_name("MINUTES")
                        .value_parser(value_parser!(u64))
                        .default_value("0"),
                )
                .arg(
                    Arg::new("cost-estimate")
                        .long("cost-estimate")
                        .value_name("AMOUNT")
                        .value_parser(value_parser!(u64))
                        .default_value("0"),
                )
                .arg(
                    Arg::new("created-by")
                        .long("created-by")
                        .value_name("UUID")
                        .help("创建者用户ID"),
                ),
        )
        .subcommand(
            Command::new("audit")
                .about("检查任务树不变量，发现破坏时以非零状态退出")
                .arg(tenant.clone().required(true))
                .arg(project.clone()),
        )
        .subcommand(
            Command::new("tree")
                .about("输出整棵子树")
                .arg(tenant.required(true))
                .arg(project)
                .arg(
                    Arg::new("task")
                        .long("task")
                        .value_name("UUID")
                        .help("子树根任务，缺省为项目根任务"),
                ),
        )
}

#[tokio::main]
async fn main() -> Result<()> {
    let matches = cli().get_matches();

    let mut config = AppConfig::load(matches.get_one::<String>("config").map(String::as_str))
        .context("加载配置失败")?;
    if let Some(level) = matches.get_one::<String>("log-level") {
        config.observability.log_level = level.clone();
    }
    if let Some(format) = matches.get_one::<String>("log-format") {
        config.observability.log_format = format.clone();
    }
    init_logging(&config.observability)?;

    let app = Application::new(config).await?;
    let result = run(&app, &matches).await;
    app.shutdown().await;
    result
}

async fn run(app: &Application, matches: &ArgMatches) -> Result<()> {
    let service = app.service();
    match matches.subcommand() {
        Some(("migrate", _)) => {
            app.health_check().await?;
            info!("数据库迁移完成: {:?}", app.database_type());
            println!("ok");
        }
        Some(("create-project", args)) => {
            let tenant = match args.get_one::<String>("tenant") {
                Some(raw) => parse_id::<TenantId>(raw, "租户ID")?,
                None => TenantId::new(),
            };
            let created_by = match args.get_one::<String>("created-by") {
                Some(raw) => parse_id::<UserId>(raw, "用户ID")?,
                None => UserId::new(),
            };
            let name = required(args, "name")?;
            let fields = NewTask::new(name, created_by)
                .description(required(args, "description")?)
                .parallel(args.get_flag("parallel"))
                .time_estimate(args.get_one::<u64>("time-estimate").copied().unwrap_or(0))
                .cost_estimate(args.get_one::<u64>("cost-estimate").copied().unwrap_or(0));
            let root = service.create_project(tenant, fields).await?;
            print_json(&root)?;
        }
        Some(("audit", args)) => {
            let scope = scope_from(args)?;
            let report = service.audit(scope).await?;
            print_json(&report)?;
            if !report.is_consistent() {
                warn!("发现 {} 处不变量破坏", report.violations.len());
                anyhow::bail!("任务树 {} 不一致", scope);
            }
        }
        Some(("tree", args)) => {
            let scope = scope_from(args)?;
            let task = match args.get_one::<String>("task") {
                Some(raw) => parse_id::<TaskId>(raw, "任务ID")?,
                None => scope.root_id(),
            };
            let subtree = service.subtree(scope, task).await?;
            print_json(&subtree)?;
        }
        Some((other, _)) => anyhow::bail!("不支持的命令: {other}"),
        None => anyhow::bail!("缺少子命令"),
    }
    Ok(())
}

fn scope_from(args: &ArgMatches) -> Result<TreeScope> {
    let tenant = parse_id::<TenantId>(required(args, "tenant")?, "租户ID")?;
    let project = parse_id::<TaskId>(required(args, "project")?, "项目ID")?;
    Ok(TreeScope::new(tenant, project))
}

fn required<'a>(args: &'a ArgMatches, name: &str) -> Result<&'a str> {
    args.get_one::<String>(name)
        .map(String::as_str)
        .with_context(|| format!("缺少参数 --{name}"))
}

fn parse_id<T>(raw: &str, what: &str) -> Result<T>
where
    T: std::str::FromStr<Err = uuid::Error>,
{
    raw.parse::<T>()
        .with_context(|| format!("无效的{what}: {raw}"))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(value).context("序列化输出失败")?
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition_is_valid() {
        cli().debug_assert();
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let tenant = TenantId::new();
        let project = TaskId::new();
        let (tenant_arg, project_arg) = (tenant.to_string(), project.to_string());
        let matches = cli()
            .try_get_matches_from([
                "tasktree",
                "audit",
                "--tenant",
                tenant_arg.as_str(),
                "--project",
                project_arg.as_str(),
                "--log-level",
                "debug",
            ])
            .unwrap();
        assert_eq!(
            matches.get_one::<String>("log-level").map(String::as_str),
            Some("debug")
        );
        let (_, args) = matches.subcommand().unwrap();
        assert_eq!(scope_from(args).unwrap(), TreeScope::new(tenant, project));
    }

    #[test]
    fn test_tree_requires_project() {
        let result = cli().try_get_matches_from(["tasktree", "tree", "--tenant", "x"]);
        assert!(result.is_err());
    }
}
