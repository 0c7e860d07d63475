mod common;

use common::{init_tracing, wait_until, with_timeout, CrontabJobBuilder, DaemonJobBuilder, TestAgent, TestResult};
use crontabd::errors::AgentError;
use crontabd::service::proto::{
    ActionJobsArgs, CleanLogFilesArgs, EditCrontabJobArgs, EditDaemonJobArgs, GetJobArgs, QueryJobArgs,
    SearchLogArgs,
};
use crontabd::service::{AgentService, CrontabJobService, DaemonJobService};
use crontabd::types::{CleanUnit, JobStatus, Scope};

const NODE: &str = "127.0.0.1:20001";

fn user(group_id: u64, user_id: u64) -> Scope {
    Scope {
        user_id,
        group_id,
        root: false,
    }
}

fn ids(scope: Scope, job_ids: &[u64]) -> ActionJobsArgs {
    ActionJobsArgs {
        scope,
        job_ids: job_ids.to_vec(),
    }
}

async fn create(service: &CrontabJobService, scope: Scope, builder: CrontabJobBuilder) -> u64 {
    let mut job = builder.build();
    job.group_id = 0;
    job.created_user_id = 0;
    service
        .edit(EditCrontabJobArgs { scope, job })
        .await
        .expect("insert")
        .id
}

#[tokio::test]
async fn list_is_scoped_and_lists_own_records_first() -> TestResult {
    init_tracing();
    let test = TestAgent::new(NODE);
    let service = CrontabJobService::new(test.agent.clone());
    let alice = user(2, 10);
    let bob = user(2, 11);

    let a1 = create(&service, alice, CrontabJobBuilder::new("alice-backup").command(&["true"])).await;
    let b1 = create(&service, bob, CrontabJobBuilder::new("bob-backup").command(&["true"])).await;
    let _other = create(&service, user(3, 12), CrontabJobBuilder::new("elsewhere").command(&["true"])).await;

    let own = service.list(QueryJobArgs {
        scope: alice,
        ..Default::default()
    })?;
    assert_eq!(own.total, 1);
    assert_eq!(own.list[0].id, a1);
    assert_eq!(own.pagesize, 20);

    let group_root = Scope { root: true, ..bob };
    let group = service.list(QueryJobArgs {
        scope: group_root,
        ..Default::default()
    })?;
    assert_eq!(group.list.iter().map(|r| r.id).collect::<Vec<_>>(), vec![b1, a1]);

    let everyone = service.list(QueryJobArgs {
        scope: Scope::super_group(),
        search_txt: "backup".to_string(),
        ..Default::default()
    })?;
    assert_eq!(everyone.total, 2);

    let err = service.get(GetJobArgs { scope: bob, job_id: a1 });
    assert!(matches!(err, Err(AgentError::RecordNotFound)));
    Ok(())
}

#[tokio::test]
async fn crontab_lifecycle_through_audit_start_stop_delete() -> TestResult {
    let test = TestAgent::new(NODE);
    let service = CrontabJobService::new(test.agent.clone());
    let scope = user(2, 10);
    let id = create(
        &service,
        scope,
        CrontabJobBuilder::new("nightly")
            .never()
            .command(&["true"])
            .status(JobStatus::Unaudited),
    )
    .await;

    // Unaudited records cannot start.
    assert!(service.start(ids(scope, &[id]))?.is_empty());

    let audited = service.audit(ids(user(2, 99), &[id]))?;
    assert_eq!(audited.len(), 1);
    assert_eq!(audited[0].status, JobStatus::Ok);

    let started = service.start(ids(scope, &[id]))?;
    assert_eq!(started[0].status, JobStatus::Timing);
    assert!(test.agent.crontab().contains(id));

    let stopped = service.stop(ids(scope, &[id])).await?;
    assert_eq!(stopped[0].status, JobStatus::Stop);
    assert!(!test.agent.crontab().contains(id));

    service.start(ids(scope, &[id]))?;
    let deleted = service.delete(ids(scope, &[id])).await?;
    assert_eq!(deleted.len(), 1);
    assert!(!test.agent.crontab().contains(id));
    assert!(service.get(GetJobArgs { scope, job_id: id }).is_err());
    Ok(())
}

#[tokio::test]
async fn edit_reschedules_a_running_definition() -> TestResult {
    let test = TestAgent::new(NODE);
    let service = CrontabJobService::new(test.agent.clone());
    let scope = user(2, 10);
    let id = create(&service, scope, CrontabJobBuilder::new("v1").never().command(&["true"])).await;
    service.start(ids(scope, &[id]))?;

    let mut job = service.get(GetJobArgs { scope, job_id: id })?;
    job.name = "v2".to_string();
    job.created_user_id = 4242;
    let saved = service.edit(EditCrontabJobArgs { scope, job }).await?;

    assert_eq!(saved.name, "v2");
    assert_eq!(saved.created_user_id, 10, "creator is an audit field");
    let entry = test.agent.crontab().get(id).ok_or("not rescheduled")?;
    assert_eq!(entry.job.value.name, "v2");
    Ok(())
}

#[tokio::test]
async fn action_errors() -> TestResult {
    let test = TestAgent::new(NODE);
    let service = CrontabJobService::new(test.agent.clone());

    assert!(matches!(service.start(ids(user(2, 10), &[])), Err(AgentError::EmptyIds)));
    assert!(matches!(
        service.kill(ids(user(2, 10), &[77])).await,
        Err(AgentError::RecordNotFound)
    ));
    Ok(())
}

#[tokio::test]
async fn exec_returns_market_tagged_output() -> TestResult {
    let test = TestAgent::new(NODE);
    let service = CrontabJobService::new(test.agent.clone());
    let scope = user(2, 10);
    let id = create(&service, scope, CrontabJobBuilder::new("once").never().command(&["echo", "hi"])).await;

    let reply = with_timeout(service.exec(GetJobArgs { scope, job_id: id })).await?;

    assert_eq!(reply.job.id, id);
    assert_eq!(String::from_utf8(reply.content)?, "[manual]hi\n");
    assert!(test.agent.tmp_jobs().is_empty());

    let stored = service.get(GetJobArgs { scope, job_id: id })?;
    assert_eq!(stored.last_exit_status, "success");
    assert!(stored.last_exec_time.is_some());
    Ok(())
}

#[tokio::test]
async fn execs_runs_in_the_background() -> TestResult {
    let test = TestAgent::new(NODE);
    let service = CrontabJobService::new(test.agent.clone());
    let scope = user(2, 10);
    let id = create(&service, scope, CrontabJobBuilder::new("bg").never().command(&["echo", "bg"])).await;

    let fired = service.execs(ids(scope, &[id]))?;
    assert_eq!(fired.len(), 1);
    assert!(wait_until(|| test.read_log("crontab_task", id) == "bg\n").await);
    Ok(())
}

#[tokio::test]
async fn log_search_pages_through_today_file() -> TestResult {
    let test = TestAgent::new(NODE);
    let service = CrontabJobService::new(test.agent.clone());
    let scope = user(2, 10);
    let id = create(
        &service,
        scope,
        CrontabJobBuilder::new("noisy").never().command(&["printf", "ok 1\\nerr 2\\nok 3\\nerr 4\\n"]),
    )
    .await;
    with_timeout(service.exec(GetJobArgs { scope, job_id: id })).await?;

    let head = service.log(SearchLogArgs {
        scope,
        job_id: id,
        pattern: "err".to_string(),
        pagesize: 1,
        ..Default::default()
    })?;
    assert_eq!(String::from_utf8(head.content)?, "[manual]err 2\n");
    assert_eq!(head.file_size, 54);

    let next = service.log(SearchLogArgs {
        scope,
        job_id: id,
        pattern: "err".to_string(),
        pagesize: 1,
        offset: head.offset,
        ..Default::default()
    })?;
    assert_eq!(String::from_utf8(next.content)?, "[manual]err 4\n");

    let tail = service.log(SearchLogArgs {
        scope,
        job_id: id,
        pagesize: 2,
        is_tail: true,
        ..Default::default()
    })?;
    assert_eq!(String::from_utf8(tail.content)?, "[manual]err 4\n[manual]ok 3\n");

    let missing = service.log(SearchLogArgs {
        scope,
        job_id: id,
        date: "2001/01/01".to_string(),
        ..Default::default()
    })?;
    assert!(missing.content.is_empty());

    assert!(matches!(
        service.log(SearchLogArgs {
            scope,
            job_id: id,
            date: "yesterday".to_string(),
            ..Default::default()
        }),
        Err(AgentError::InvalidLogDate(_))
    ));
    Ok(())
}

#[tokio::test]
async fn daemon_crud_is_scoped() -> TestResult {
    let test = TestAgent::new(NODE);
    let service = DaemonJobService::new(test.agent.clone());
    let scope = user(2, 10);

    let mut job = DaemonJobBuilder::new("worker").command(&["sleep", "30"]).build();
    job.group_id = 0;
    job.created_user_id = 0;
    let created = service.edit(EditDaemonJobArgs { scope, job })?;
    assert_eq!((created.group_id, created.created_user_id), (2, 10));

    let started = service.start(ids(scope, &[created.id]))?;
    assert_eq!(started[0].status, JobStatus::Running);
    assert!(started[0].start_at.is_some());
    assert!(test.agent.daemons().is_running(created.id));

    // Another user of the group can neither stop nor delete it.
    assert!(service.stop(ids(user(2, 11), &[created.id]))?.is_empty());
    assert!(service.delete(ids(user(2, 11), &[created.id]))?.is_empty());

    let stopped = service.stop(ids(scope, &[created.id]))?;
    assert_eq!(stopped[0].status, JobStatus::Stop);
    assert!(!test.agent.daemons().is_running(created.id));

    assert_eq!(service.delete(ids(scope, &[created.id]))?.len(), 1);
    assert_eq!(
        service
            .list(QueryJobArgs {
                scope,
                ..Default::default()
            })?
            .total,
        0
    );
    Ok(())
}

#[tokio::test]
async fn clean_log_files_removes_old_files() -> TestResult {
    let test = TestAgent::new(NODE);
    let service = AgentService::new(test.agent.clone());
    let old = test.dir.path().join("crontab_task/2020/01/01/1.log");
    std::fs::create_dir_all(old.parent().ok_or("no parent")?)?;
    std::fs::write(&old, b"0123456789")?;

    let kept = service
        .clean_log_files(CleanLogFilesArgs {
            unit: CleanUnit::Day,
            offset: 1,
        })
        .await?;
    assert_eq!(kept.total, 0);
    assert!(old.exists());

    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    let cleaned = service
        .clean_log_files(CleanLogFilesArgs {
            unit: CleanUnit::Day,
            offset: 0,
        })
        .await?;
    assert_eq!(cleaned.total, 1);
    assert_eq!(cleaned.size, "10B");
    assert!(!old.exists());
    assert!(!test.dir.path().join("crontab_task/2020").exists());
    Ok(())
}

#[tokio::test]
async fn system_info_reports_node_state() -> TestResult {
    let test = TestAgent::new(NODE);
    let service = AgentService::new(test.agent.clone());
    service.ping()?;
    let day = test.dir.path().join("daemon_job/2026/03/14");
    std::fs::create_dir_all(&day)?;
    std::fs::write(day.join("7.log"), b"0123456789")?;

    let info = service.system_info().await?;
    for key in [
        "version",
        "pid",
        "node_addr",
        "os",
        "arch",
        "cpu_count",
        "uptime",
        "crontab_jobs",
        "daemon_jobs",
        "tmp_jobs",
        "pending_depends",
        "log_size",
    ] {
        assert!(info.contains_key(key), "missing {key}");
    }
    assert_eq!(info["node_addr"], NODE);
    assert_eq!(info["crontab_jobs"], "0");
    assert_eq!(info["log_size"], "10B");
    Ok(())
}
