mod common;

use common::{FakeService, RecordingPrompt, MULTIPLE_SUITES, SINGLE_SUITE};
use serde_json::json;
use tmsync_core::matcher::MatchError;
use tmsync_core::model::RunSpec;
use tmsync_core::reconcile::ReconcileError;
use tmsync_core::{
    Case, CaseResult, Config, MatcherKind, ResultsUploader, Section, Status, SubmissionEngine, Suite,
    UploadError,
};

fn config(matcher: MatcherKind) -> Config {
    let mut config = Config::default();
    config.server.host = Some("https://fake.example".to_string());
    config.upload.project_id = Some(1);
    config.upload.title = Some("Nightly".to_string());
    config.upload.case_matcher = matcher;
    config
}

fn case(title: &str, automation_id: &str, status: Status) -> Case {
    let mut case = Case::new(title).with_automation_id(automation_id);
    case.result = CaseResult::with_status(status);
    case
}

fn login_suite() -> Suite {
    let mut section = Section::new("tests.login");
    section.cases.push(case("ok", "tests.login.ok", Status::Passed));
    section.cases.push(case("bad", "tests.login.bad", Status::Failed));
    let mut suite = Suite::new("Regression");
    suite.sections.push(section);
    suite
}

fn uploader(service: &FakeService, config: Config, prompt: std::sync::Arc<RecordingPrompt>) -> ResultsUploader {
    ResultsUploader::new(config, service.handlers(), prompt)
}

/// A project with one suite and a login section holding case 100.
fn single_suite_service(automation_id: &str) -> FakeService {
    FakeService::new()
        .with_project(1, "Demo", SINGLE_SUITE)
        .with_suite(1, 42, "Master")
        .with_section(42, 7, "tests.login", None)
        .with_case(42, 7, 100, "ok", Some(automation_id))
}

mod single_suite {
    use super::*;

    #[tokio::test]
    async fn test_adopts_only_suite_and_adds_missing_case() {
        let service = single_suite_service("&lt;p&gt;tests.login.ok&lt;/p&gt;");
        let prompt = RecordingPrompt::answering(true);
        let uploader = uploader(&service, config(MatcherKind::Auto), prompt.clone());

        let mut suite = login_suite();
        let report = uploader.upload(&mut suite).await.unwrap();

        assert_eq!(report.suite_id, 42);
        assert!(!report.suite_created);
        assert_eq!(report.cases_added, 1);
        assert_eq!(report.results_added, 2);
        assert!(report.run_id.is_some());

        // Only the case creation needed consent.
        let questions = prompt.questions();
        assert_eq!(questions.len(), 1);
        assert!(questions[0].contains("Would you like to add them?"));

        assert_eq!(service.count("add_suite"), 0);
        assert_eq!(service.count("add_section"), 0);
        assert_eq!(service.count("add_case"), 1);

        let added = service.last_body("add_case").unwrap();
        assert_eq!(added["title"], "bad");
        assert_eq!(added["custom_automation_id"], "tests.login.bad");
        assert!(service.posts().contains(&"add_case/7".to_string()));

        let cases = suite.cases();
        assert_eq!(cases[0].case_id, Some(100));
        assert_eq!(cases[1].section_id, Some(7));

        let run = service.last_body("add_run").unwrap();
        assert_eq!(run["name"], "Nightly");
        assert_eq!(run["suite_id"], 42);
        assert_eq!(run["case_ids"], json!([100, cases[1].case_id.unwrap()]));
    }

    #[tokio::test]
    async fn test_name_matcher_reports_nonexistent_ids() {
        let service = FakeService::new()
            .with_project(1, "Demo", SINGLE_SUITE)
            .with_suite(1, 42, "Master")
            .with_section(42, 7, "tests.login", None)
            .with_case(42, 7, 10, "first", None)
            .with_case(42, 7, 20, "second", None);
        let uploader = uploader(&service, config(MatcherKind::Name), RecordingPrompt::answering(true));

        let mut section = Section::new("tests.login");
        for id in [10, 20, 30] {
            let mut case = Case::new(format!("case {id}"));
            case.case_id = Some(id);
            section.cases.push(case);
        }
        let mut suite = Suite::new("Regression");
        suite.sections.push(section);

        let err = uploader.upload(&mut suite).await.unwrap_err();
        assert!(err.to_string().contains("[30]"));

        let UploadError::RolledBack { cause, log } = err else {
            panic!("expected a rolled back upload");
        };
        assert!(log.is_empty());
        match *cause {
            UploadError::Match(MatchError::NonexistentIds { ids }) => assert_eq!(ids, vec![30]),
            other => panic!("unexpected error: {other}"),
        }
        assert!(service.posts().is_empty());
    }

    #[tokio::test]
    async fn test_updates_existing_run_keeping_description() {
        let service = FakeService::new()
            .with_project(1, "Demo", SINGLE_SUITE)
            .with_suite(1, 42, "Master")
            .with_section(42, 7, "tests.login", None)
            .with_case(42, 7, 10, "first", None)
            .with_case(42, 7, 20, "second", None)
            .with_run(77, 42, "keep me", &[10]);

        let mut config = config(MatcherKind::Name);
        config.upload.title = None;
        config.upload.run_id = Some(77);
        config.upload.close_run = true;
        let prompt = RecordingPrompt::answering(false);
        let uploader = uploader(&service, config, prompt.clone());

        let mut section = Section::new("tests.login");
        let mut second = Case::new("second");
        second.case_id = Some(20);
        second.result = CaseResult::with_status(Status::Passed);
        section.cases.push(second);
        let mut suite = Suite::new("Regression");
        suite.sections.push(section);

        let report = uploader.upload(&mut suite).await.unwrap();

        assert_eq!(report.run_id, Some(77));
        assert_eq!(report.results_added, 1);
        assert!(prompt.questions().is_empty());
        assert_eq!(
            service.last_body("update_run"),
            Some(json!({
                "name": "Existing run",
                "description": "keep me",
                "suite_id": 42,
                "include_all": false,
                "case_ids": [10, 20],
            }))
        );
        assert_eq!(service.last_body("close_run"), Some(json!({"run_id": 77})));
        assert_eq!(service.count("add_run"), 0);
        assert_eq!(service.count("delete_run"), 0);
    }

    #[tokio::test]
    async fn test_update_cases_without_run() {
        let service = single_suite_service("tests.login.ok");
        let mut config = config(MatcherKind::Auto);
        config.upload.update_cases = true;
        config.upload.skip_run = true;
        let uploader = uploader(&service, config, RecordingPrompt::answering(false));

        let mut section = Section::new("tests.login");
        section.cases.push(case("ok, renamed", "tests.login.ok", Status::Passed));
        let mut suite = Suite::new("Regression");
        suite.sections.push(section);

        let report = uploader.upload(&mut suite).await.unwrap();

        assert_eq!(report.cases_updated, 1);
        assert_eq!(report.run_id, None);
        assert!(service.posts().contains(&"update_case/100".to_string()));
        assert_eq!(service.last_body("update_case").unwrap()["title"], "ok, renamed");
        assert_eq!(service.count("add_run"), 0);
    }
}

mod multiple_suites {
    use super::*;

    fn service() -> FakeService {
        FakeService::new().with_project(2, "Web", MULTIPLE_SUITES)
    }

    fn config() -> Config {
        let mut config = super::config(MatcherKind::Auto);
        config.upload.project_id = None;
        config.upload.project = Some("Web".to_string());
        config
    }

    #[tokio::test]
    async fn test_creates_tree_then_reuses_it() {
        let service = service();
        let prompt = RecordingPrompt::answering(true);
        let uploader = uploader(&service, config(), prompt.clone());

        let first = uploader.upload(&mut login_suite()).await.unwrap();
        assert!(first.suite_created);
        assert_eq!(first.cases_added, 2);
        assert_eq!(first.results_added, 2);
        assert_eq!(prompt.questions().len(), 3);
        assert_eq!(service.sections().len(), 1);

        let second = uploader.upload(&mut login_suite()).await.unwrap();
        assert!(!second.suite_created);
        assert_eq!(second.suite_id, first.suite_id);
        assert_eq!(second.cases_added, 0);
        assert_eq!(second.results_added, 2);

        assert_eq!(prompt.questions().len(), 3);
        assert_eq!(service.count("add_suite"), 1);
        assert_eq!(service.count("add_section"), 1);
        assert_eq!(service.count("add_case"), 2);
        assert_eq!(service.count("add_run"), 2);
    }

    #[tokio::test]
    async fn test_failed_results_roll_back_created_entities() {
        let service = service();
        service.fail_on("add_results_for_cases");
        let uploader = uploader(&service, config(), RecordingPrompt::answering(true));

        let err = uploader.upload(&mut login_suite()).await.unwrap_err();

        let UploadError::RolledBack { cause, log } = err else {
            panic!("expected a rolled back upload");
        };
        assert!(matches!(*cause, UploadError::Results { submitted: 0, .. }));
        assert_eq!(log.len(), 4);

        let deletes: Vec<String> = service
            .posts()
            .into_iter()
            .filter(|uri| uri.starts_with("delete_"))
            .map(|uri| uri.split('/').next().unwrap_or_default().to_string())
            .collect();
        assert_eq!(deletes, vec!["delete_run", "delete_cases", "delete_section", "delete_suite"]);

        assert!(service.suites().is_empty());
        assert!(service.sections().is_empty());
        assert!(service.cases().is_empty());
        assert!(service.runs().is_empty());
    }

    #[tokio::test]
    async fn test_declined_suite_creation_stops_upload() {
        let service = service();
        let prompt = RecordingPrompt::answering(false);
        let uploader = uploader(&service, config(), prompt.clone());

        let err = uploader.upload(&mut login_suite()).await.unwrap_err();

        assert!(matches!(err, UploadError::Reconcile(ReconcileError::Declined("suite"))));
        assert_eq!(prompt.questions().len(), 1);
        assert!(prompt.questions()[0].contains("Suite 'Regression' does not exist"));
        assert!(service.posts().is_empty());
    }

    #[tokio::test]
    async fn test_run_without_title_is_rejected() {
        let service = service();
        let mut config = config();
        config.upload.title = None;
        let uploader = uploader(&service, config, RecordingPrompt::answering(true));

        let err = uploader.upload(&mut login_suite()).await.unwrap_err();

        assert!(err.to_string().contains("--title"));
        assert_eq!(err.rollback_log().len(), 3);
        assert!(service.suites().is_empty());
    }

    #[tokio::test]
    async fn test_mismatched_suite_echo_is_rolled_back() {
        let service = service();
        service.mangle_echo("add_suite", "name");
        let uploader = ResultsUploader::new(config(), service.verifying_handlers(), RecordingPrompt::answering(true));

        let err = uploader.upload(&mut login_suite()).await.unwrap_err();

        assert!(err.to_string().contains("Data verification failed for suite"));
        assert_eq!(err.rollback_log(), ["Deleted created suite"]);
        assert!(service.suites().is_empty());
    }

    #[tokio::test]
    async fn test_mismatched_section_echo_is_rolled_back() {
        let service = service();
        service.mangle_echo("add_section", "name");
        let uploader = ResultsUploader::new(config(), service.verifying_handlers(), RecordingPrompt::answering(true));

        let err = uploader.upload(&mut login_suite()).await.unwrap_err();

        assert!(err.to_string().contains("Data verification failed for section"));
        assert_eq!(err.rollback_log(), ["Deleted created sections", "Deleted created suite"]);
        assert_eq!(service.count("add_section"), 1);
        assert_eq!(service.count("delete_section"), 1);
        assert!(service.sections().is_empty());
        assert!(service.suites().is_empty());
    }

    #[tokio::test]
    async fn test_mismatched_case_echo_is_rolled_back() {
        let service = service();
        service.mangle_echo("add_case", "title");
        let uploader = ResultsUploader::new(config(), service.verifying_handlers(), RecordingPrompt::answering(true));

        let err = uploader.upload(&mut login_suite()).await.unwrap_err();

        assert!(err.to_string().contains("Data verification failed for case"));
        assert_eq!(
            err.rollback_log(),
            ["Deleted created test cases", "Deleted created sections", "Deleted created suite"]
        );
        assert!(service.count("add_case") >= 1);
        assert!(service.cases().is_empty());
        assert_eq!(service.count("add_run"), 0);
    }

    #[tokio::test]
    async fn test_interrupt_rolls_back_cases_created_before_it() {
        let service = service();
        let interrupt = service.interrupt_on("add_case", 2);
        let mut config = config();
        config.workers.case_workers = 1;
        let uploader = ResultsUploader::new(config, service.handlers(), RecordingPrompt::answering(true))
            .with_engine(SubmissionEngine::new().with_interrupt(interrupt));

        let err = uploader.upload(&mut login_suite()).await.unwrap_err();

        let UploadError::RolledBack { cause, log } = err else {
            panic!("expected a rolled back upload");
        };
        assert!(matches!(*cause, UploadError::Reconcile(ReconcileError::Interrupted(_))));
        assert_eq!(
            log,
            vec!["Deleted created test cases", "Deleted created sections", "Deleted created suite"]
        );
        assert_eq!(service.count("add_case"), 1);
        assert_eq!(service.last_body("delete_cases").unwrap()["case_ids"].as_array().unwrap().len(), 1);
        assert!(service.cases().is_empty());
        assert!(service.sections().is_empty());
        assert!(service.suites().is_empty());
    }
}

#[tokio::test]
async fn test_cases_are_fetched_across_pages() {
    let mut service = FakeService::new().with_page_size(2);
    for id in 1..=5 {
        service = service.with_case(42, 7, id, &format!("case {id}"), None);
    }
    let handlers = service.handlers();

    let cases = handlers.cases.cases(1, 42).await.unwrap();
    assert_eq!(cases.len(), 5);
    assert_eq!(
        service
            .calls()
            .iter()
            .map(|c| c.uri.as_str())
            .collect::<Vec<_>>(),
        vec![
            "get_cases/1&suite_id=42",
            "get_cases/1&suite_id=42&limit=2&offset=2",
            "get_cases/1&suite_id=42&limit=2&offset=4",
        ]
    );

    // Served from the cache until invalidated.
    handlers.cases.cases(1, 42).await.unwrap();
    assert_eq!(service.count("get_cases"), 3);
    handlers.cases.invalidate().await;
    handlers.cases.cases(1, 42).await.unwrap();
    assert_eq!(service.count("get_cases"), 6);
}

#[tokio::test]
async fn test_run_tests_are_cached_until_the_run_changes() {
    let service = FakeService::new().with_run(77, 42, "", &[10]);
    let handlers = service.handlers();

    handlers.runs.tests(77).await.unwrap();
    handlers.runs.tests(77).await.unwrap();
    assert_eq!(service.count("get_tests"), 1);

    let spec = RunSpec {
        case_ids: vec![10, 20],
        ..Default::default()
    };
    handlers.runs.update_run(77, &spec).await.unwrap();

    let tests = handlers.runs.tests(77).await.unwrap();
    assert_eq!(tests.len(), 2);
    assert_eq!(service.count("get_tests"), 2);
}
