//! An editing session: the workbench plus the runner.

use coderun_gallery::{Result, Snapshot, SnapshotStore, Workbench};
use coderun_runner::{RunOutput, Runner};

/// Editor state and console for one user.
///
/// Any change to the buffer clears the console display; the output shown
/// always belongs to the text that is in the buffer.
pub struct Session<S> {
    workbench: Workbench<S>,
    runner: Runner,
}

impl<S: SnapshotStore> Session<S> {
    pub fn new(workbench: Workbench<S>, runner: Runner) -> Self {
        Self { workbench, runner }
    }

    pub fn workbench(&self) -> &Workbench<S> {
        &self.workbench
    }

    pub fn runner(&self) -> &Runner {
        &self.runner
    }

    pub fn select(&mut self, index: usize) -> Result<Snapshot> {
        let snapshot = self.workbench.switch_to(index)?;
        self.runner.console().clear();
        Ok(snapshot)
    }

    pub fn edit(&mut self, text: &str) -> Result<Snapshot> {
        let snapshot = self.workbench.edit(text)?;
        self.runner.console().clear();
        Ok(snapshot)
    }

    pub fn save(&mut self) -> Result<Snapshot> {
        self.workbench.save()
    }

    pub fn reset(&mut self) -> Result<Snapshot> {
        let snapshot = self.workbench.reset()?;
        self.runner.console().clear();
        Ok(snapshot)
    }

    /// Run the buffer as it is now
    pub async fn run(&self) -> RunOutput {
        self.runner.run(self.workbench.buffer()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use coderun_gallery::{Gallery, Locale, MemoryStore};
    use coderun_relay::Forwarder;
    use coderun_runner::{FixtureBridge, HttpRoute};
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn session(locale: Locale) -> Session<MemoryStore> {
        let http = HttpRoute::Direct(Forwarder::new(Duration::from_secs(5)).unwrap());
        let runner = Runner::builder(Arc::new(FixtureBridge::default()), http).build();
        let workbench = Workbench::open(Gallery::new(locale, MemoryStore::new())).unwrap();
        Session::new(workbench, runner)
    }

    #[test_log::test(tokio::test(flavor = "multi_thread"))]
    async fn builtin_templates_run_against_the_fixture() {
        let mut session = session(Locale::En);

        let expected = [
            (0, "hello world\n"),
            (1, "Tasks\n"),
            (2, "[\"rec1\",\"rec2\"]\n"),
            (
                3,
                "[{\"id\":\"fldTitle\",\"name\":\"Title\",\"type\":\"text\"},\
                 {\"id\":\"fldDone\",\"name\":\"Done\",\"type\":\"checkbox\"}]\n",
            ),
            (5, "Success\n"),
        ];
        for (index, logs) in expected {
            session.select(index).unwrap();
            let out = session.run().await;
            assert_eq!(out.error, None, "template {index}");
            assert_eq!(out.logs, logs, "template {index}");
        }
    }

    #[test_log::test(tokio::test(flavor = "multi_thread"))]
    async fn http_template_posts_a_form() {
        let remote = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/cell_translate"))
            .and(header("content-type", "application/x-www-form-urlencoded"))
            .and(body_string_contains("from=zh"))
            .and(body_string_contains("to=en"))
            .respond_with(ResponseTemplate::new(200).set_body_string("test script"))
            .expect(1)
            .mount(&remote)
            .await;

        let mut session = session(Locale::En);
        let template = session.select(4).unwrap().text;
        assert!(template.contains("https://base-translator-api.replit.app"));
        let local = template.replace("https://base-translator-api.replit.app", &remote.uri());
        session.edit(&local).unwrap();

        let out = session.run().await;
        assert_eq!(out.error, None);
        assert_eq!(out.logs, "test script\n");
    }

    #[test_log::test(tokio::test(flavor = "multi_thread"))]
    async fn localized_add_record_writes_localized_value() {
        let bridge = Arc::new(FixtureBridge::default());
        let http = HttpRoute::Direct(Forwarder::new(Duration::from_secs(5)).unwrap());
        let runner = Runner::builder(bridge.clone(), http).build();
        let workbench = Workbench::open_at(Gallery::new(Locale::Zh, MemoryStore::new()), 5).unwrap();
        let session = Session::new(workbench, runner);

        let out = session.run().await;
        assert_eq!(out.logs, "成功\n");

        let workbook = bridge.workbook();
        let added = workbook.tables[0].records.last().unwrap();
        assert_eq!(added.fields["fldTitle"], "新增的一行");
    }

    #[test_log::test(tokio::test(flavor = "multi_thread"))]
    async fn editing_clears_the_console() {
        let mut session = session(Locale::En);
        session.run().await;
        assert!(session.runner().console().display().is_some());

        session.edit("log(\"edited\");").unwrap();
        assert!(session.runner().console().display().is_none());

        let out = session.run().await;
        assert_eq!(out.logs, "edited\n");
        assert_eq!(session.runner().console().display(), Some(out));
    }

    #[test_log::test(tokio::test(flavor = "multi_thread"))]
    async fn failed_run_shows_error_and_logs() {
        let mut session = session(Locale::En);
        session
            .edit("log(\"start\");\nfn main() { throw \"boom\"; }")
            .unwrap();
        let out = session.run().await;
        assert_eq!(out.logs, "start\n");
        assert!(out.error.unwrap().contains("boom"));
    }
}
