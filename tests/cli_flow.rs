mod support;

use predicates::str::contains;
use serde_json::Value;

use support::{taskdesk_cmd, TestHome, PASSWORD};

fn task_status(home: &TestHome, id: &str) -> String {
    let value = home.json(&["task", "show", id]);
    value["data"]["status"].as_str().expect("status").to_string()
}

#[test]
fn help_lists_commands() {
    taskdesk_cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(contains("task"))
        .stdout(contains("admin"))
        .stdout(contains("dashboard"));
}

#[test]
fn commands_require_a_session() {
    let home = TestHome::new();
    home.cmd()
        .arg("dashboard")
        .assert()
        .code(3)
        .stderr(contains("Not signed in"))
        .stderr(contains("taskdesk login"));

    let value = home.json(&["task", "list"]);
    assert_eq!(value["status"], "error");
    assert_eq!(value["command"], "task list");
    assert_eq!(value["error"]["kind"], "unauthenticated");
}

#[test]
fn signup_login_and_whoami() {
    let home = TestHome::new();
    home.cmd()
        .args([
            "signup",
            "--email",
            "new@example.com",
            "--password",
            PASSWORD,
            "--first-name",
            "Nia",
        ])
        .assert()
        .success()
        .stdout(contains("Account created"));

    let value = home.json(&["whoami"]);
    assert_eq!(value["data"]["email"], "new@example.com");
    assert_eq!(value["data"]["role"], "Regular");

    home.cmd().arg("logout").assert().success();
    home.cmd().arg("whoami").assert().code(3);

    home.cmd()
        .args(["login", "--email", "new@example.com", "--password", "wrong-one"])
        .assert()
        .code(2)
        .stderr(contains("invalid login credentials"));
}

#[test]
fn task_lifecycle_moves_forward_only() {
    let home = TestHome::new();
    home.provision("rita@example.com", "Rita", "Ops", "Regular");
    home.login("rita@example.com");

    let id = home.create_task("Write release notes");
    assert_eq!(task_status(&home, &id), "pending");

    home.cmd().args(["task", "complete", &id]).assert().code(2);

    home.cmd()
        .args(["task", "start", &id])
        .assert()
        .success()
        .stdout(contains("in-progress"));

    let value = home.json(&["task", "advance", &id, "--to", "pending"]);
    assert_eq!(value["error"]["kind"], "invalid_transition");
    assert_eq!(value["error"]["details"]["from"], "in-progress");

    home.cmd().args(["task", "complete", &id]).assert().success();
    assert_eq!(task_status(&home, &id), "completed");

    let value = home.json(&["task", "list", "--status", "completed"]);
    assert_eq!(value["data"]["count"], 1);
    let value = home.json(&["task", "list", "--status", "pending"]);
    assert_eq!(value["data"]["count"], 0);
}

#[test]
fn edit_and_remarks() {
    let home = TestHome::new();
    home.provision("rita@example.com", "Rita", "Ops", "Regular");
    home.login("rita@example.com");
    let id = home.create_task("Draft");

    let value = home.json(&[
        "task",
        "edit",
        &id,
        "--title",
        "Final",
        "--priority",
        "high",
        "--due",
        "2030-01-31",
    ]);
    assert_eq!(value["data"]["title"], "Final");
    assert_eq!(value["data"]["priority"], "high");
    assert_eq!(value["data"]["due_date"], "2030-01-31");

    let value = home.json(&["task", "remarks", &id, "waiting on legal"]);
    assert_eq!(value["data"]["remarks"], "waiting on legal");
    let value = home.json(&["task", "remarks", &id, "--clear"]);
    assert!(value["data"].get("remarks").map_or(true, Value::is_null));

    home.cmd()
        .args(["task", "edit", &id, "--due", "31/01/2030"])
        .assert()
        .code(2)
        .stderr(contains("YYYY-MM-DD"));
}

#[test]
fn delete_requires_confirmation() {
    let home = TestHome::new();
    home.provision("rita@example.com", "Rita", "Ops", "Regular");
    home.login("rita@example.com");
    let id = home.create_task("Throwaway");

    home.cmd()
        .args(["task", "delete", &id])
        .assert()
        .code(2)
        .stderr(contains("Are you absolutely sure?"))
        .stderr(contains("--yes"));
    assert_eq!(task_status(&home, &id), "pending");

    home.cmd()
        .args(["task", "delete", &id, "--yes"])
        .assert()
        .success();
    let value = home.json(&["task", "show", &id]);
    assert_eq!(value["error"]["kind"], "not_found");
}

#[test]
fn users_cannot_see_each_others_tasks() {
    let home = TestHome::new();
    home.provision("rita@example.com", "Rita", "Ops", "Regular");
    home.provision("sam@example.com", "Sam", "Sales", "Regular");

    home.login("rita@example.com");
    let rita_task = home.create_task("Rita's task");

    home.login("sam@example.com");
    home.create_task("Sam's task");
    let value = home.json(&["task", "list"]);
    assert_eq!(value["data"]["count"], 1);
    assert_eq!(value["data"]["tasks"][0]["title"], "Sam's task");

    home.cmd().args(["task", "show", &rita_task]).assert().code(2);
}

#[test]
fn admin_views_are_gated_by_role() {
    let home = TestHome::new();
    home.provision("ada@example.com", "Ada", "Ops", "Admin");
    let rita = home.provision("rita@example.com", "Rita", "Ops", "Regular");
    home.provision("sam@example.com", "Sam", "Sales", "Regular");

    home.login("rita@example.com");
    home.create_task("Ops work");
    home.cmd()
        .args(["admin", "summary"])
        .assert()
        .code(3)
        .stderr(contains("You do not have permission to view this page."));

    let value = home.json(&["open", "/admin/users"]);
    assert_eq!(value["data"]["state"], "denied");
    assert_eq!(value["data"]["denial"]["redirect"]["to"], "/dashboard");

    home.login("sam@example.com");
    home.create_task("Sales work");

    home.login("ada@example.com");
    let value = home.json(&["admin", "summary"]);
    assert_eq!(value["data"]["total_tasks"], 2);
    assert_eq!(value["data"]["pending_tasks"], 2);

    let value = home.json(&["admin", "tasks", "--department", "ops"]);
    assert_eq!(value["data"]["count"], 1);
    assert_eq!(value["data"]["tasks"][0]["first_name"], "Rita");

    let value = home.json(&["admin", "tasks", "--user", "sam@example.com"]);
    assert_eq!(value["data"]["count"], 1);
    assert_eq!(value["data"]["tasks"][0]["department"], "Sales");

    let value = home.json(&["admin", "users"]);
    assert_eq!(value["data"].as_array().map(Vec::len), Some(3));

    let value = home.json(&["task", "create", "Assigned", "--owner", &rita]);
    assert_eq!(value["data"]["user_id"], rita.as_str());
}

#[test]
fn announcements_reach_the_dashboard() {
    let home = TestHome::new();
    home.provision("ada@example.com", "Ada", "Ops", "Admin");
    home.provision("rita@example.com", "Rita", "Ops", "Regular");

    home.login("ada@example.com");
    home.cmd()
        .args(["admin", "announce", "short"])
        .assert()
        .code(2)
        .stderr(contains("at least 10 characters"));
    home.cmd()
        .args(["admin", "announce", "Office closed on Friday"])
        .assert()
        .success();

    home.login("rita@example.com");
    let value = home.json(&["dashboard"]);
    assert_eq!(value["data"]["greeting_name"], "Rita");
    assert_eq!(value["data"]["announcement"], "Office closed on Friday");

    home.login("ada@example.com");
    home.cmd()
        .args(["admin", "announce", "--hide"])
        .assert()
        .success();
    home.login("rita@example.com");
    let value = home.json(&["dashboard"]);
    assert!(value["data"].get("announcement").is_none());
}

#[test]
fn reports_are_written_to_disk() {
    let home = TestHome::new();
    home.provision("ada@example.com", "Ada", "Ops", "Admin");
    home.login("ada@example.com");
    home.create_task("Quarterly review");

    let out = home.file("mine.json");
    home.cmd()
        .args(["report", "--period", "month", "--out"])
        .arg(&out)
        .assert()
        .success();
    let report: Value =
        serde_json::from_str(&std::fs::read_to_string(&out).expect("report file")).expect("json");
    assert_eq!(report["period"], "month");
    assert_eq!(report["rows"][0][0], "Quarterly review");

    let out = home.file("team.txt");
    home.cmd()
        .args(["admin", "report", "--department", "Ops", "--out"])
        .arg(&out)
        .assert()
        .success();
    let text = std::fs::read_to_string(&out).expect("report file");
    assert!(text.contains("Task Report: Ops (week)"));
    assert!(text.contains("Quarterly review"));

    home.cmd()
        .args(["report", "--period", "year"])
        .assert()
        .code(2);
}

#[test]
fn events_are_written_as_jsonl() {
    let home = TestHome::new();
    home.provision("rita@example.com", "Rita", "Ops", "Regular");
    let events = home.file("events.jsonl");

    home.cmd()
        .args(["--events"])
        .arg(&events)
        .args(["login", "--email", "rita@example.com", "--password", PASSWORD])
        .assert()
        .success();
    home.cmd()
        .args(["--events"])
        .arg(&events)
        .args(["admin", "users"])
        .assert()
        .code(3);

    let lines: Vec<Value> = std::fs::read_to_string(&events)
        .expect("events file")
        .lines()
        .map(|line| serde_json::from_str(line).expect("event json"))
        .collect();
    let kinds: Vec<&str> = lines
        .iter()
        .filter_map(|event| event["event"].as_str())
        .collect();
    assert_eq!(kinds, ["signed_in", "access_denied"]);
    assert!(lines
        .iter()
        .all(|event| event["schema_version"] == "taskdesk.event.v1"));
}

#[test]
fn password_update_checks_confirmation() {
    let home = TestHome::new();
    home.provision("rita@example.com", "Rita", "Ops", "Regular");
    home.login("rita@example.com");

    home.cmd()
        .args(["password", "--new", "newpass1", "--confirm", "newpass2"])
        .assert()
        .code(2)
        .stderr(contains("passwords do not match"));
    home.cmd()
        .args(["password", "--new", "tiny", "--confirm", "tiny"])
        .assert()
        .code(2);
    home.cmd()
        .args(["password", "--new", "newpass1", "--confirm", "newpass1"])
        .assert()
        .success();

    home.cmd()
        .args(["login", "--email", "rita@example.com", "--password", "newpass1"])
        .assert()
        .success();
}

#[test]
fn config_file_sets_task_defaults() {
    let home = TestHome::new();
    home.write_config("[tasks]\ndefault_priority = \"high\"\n");
    home.provision("rita@example.com", "Rita", "Ops", "Regular");
    home.login("rita@example.com");

    let value = home.json(&["task", "create", "Urgent by default"]);
    assert_eq!(value["data"]["priority"], "high");
}

#[test]
fn invalid_config_is_reported() {
    let home = TestHome::new();
    home.write_config("[filters]\ntimezone = \"Mars/Olympus\"\n");
    home.cmd()
        .arg("whoami")
        .assert()
        .code(2)
        .stderr(contains("Invalid configuration"))
        .stderr(contains("taskdesk.toml"));
}

#[test]
fn oversized_session_ttl_is_a_config_error() {
    let home = TestHome::new();
    home.write_config("[session]\nttl = \"100000000w\"\n");
    home.cmd()
        .args([
            "signup",
            "--email",
            "new@example.com",
            "--password",
            PASSWORD,
        ])
        .assert()
        .code(2)
        .stderr(contains("session.ttl must not exceed 365d"));
}
