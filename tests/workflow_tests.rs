#[cfg(test)]
mod tests {
    use cutdesk_lib::api::{
        ApiFuture, HealthResponse, MediaKind, TaskAccepted, TaskStatusResponse, TimelineRequest,
        VideoApi, VideoLibrary,
    };
    use cutdesk_lib::commands::{execute, Command};
    use cutdesk_lib::edit::EditRequest;
    use cutdesk_lib::playback::{CutPoint, HeadlessPlayer};
    use cutdesk_lib::tasks::{PollOutcome, TaskStatus};
    use cutdesk_lib::{ClientConfig, Editor};
    use futures::FutureExt;
    use std::collections::HashMap;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    /// Backend stand-in: each task reports PENDING on its first poll and
    /// SUCCESS afterwards; a finished upload publishes its proxy.
    #[derive(Default)]
    struct ProxyServer {
        originals: Mutex<Vec<String>>,
        proxies: Mutex<Vec<String>>,
        jobs: Mutex<HashMap<String, (String, usize)>>,
        requests: AtomicUsize,
        timelines: Mutex<Vec<TimelineRequest>>,
    }

    impl ProxyServer {
        fn queue(&self, file: Option<String>) -> TaskAccepted {
            let mut jobs = self.jobs.lock().unwrap();
            let task_id = format!("T{}", jobs.len() + 1);
            jobs.insert(task_id.clone(), (file.unwrap_or_default(), 0));
            TaskAccepted::new(task_id)
        }

        fn requests(&self) -> usize {
            self.requests.load(Ordering::SeqCst)
        }
    }

    impl VideoApi for ProxyServer {
        fn health(&self) -> ApiFuture<'_, HealthResponse> {
            self.requests.fetch_add(1, Ordering::SeqCst);
            async {
                Ok(HealthResponse {
                    message: "API is running.".to_string(),
                })
            }
            .boxed()
        }

        fn list_videos(&self) -> ApiFuture<'_, VideoLibrary> {
            self.requests.fetch_add(1, Ordering::SeqCst);
            let library = VideoLibrary {
                originals: self.originals.lock().unwrap().clone(),
                proxies: self.proxies.lock().unwrap().clone(),
            };
            async move { Ok(library) }.boxed()
        }

        fn upload_video(&self, file_name: String, _bytes: Vec<u8>) -> ApiFuture<'_, TaskAccepted> {
            self.requests.fetch_add(1, Ordering::SeqCst);
            self.originals.lock().unwrap().push(file_name.clone());
            let accepted = self.queue(Some(file_name));
            async move { Ok(accepted) }.boxed()
        }

        fn task_status(&self, task_id: String) -> ApiFuture<'_, TaskStatusResponse> {
            self.requests.fetch_add(1, Ordering::SeqCst);
            let status = {
                let mut jobs = self.jobs.lock().unwrap();
                match jobs.get_mut(&task_id) {
                    Some((file, polls)) => {
                        *polls += 1;
                        if *polls == 1 {
                            TaskStatus::Pending
                        } else {
                            if *polls == 2 && !file.is_empty() {
                                self.proxies.lock().unwrap().push(format!("proxy_{}", file));
                            }
                            TaskStatus::Success
                        }
                    }
                    None => TaskStatus::Pending,
                }
            };
            async move { Ok(TaskStatusResponse::new(status)) }.boxed()
        }

        fn submit_edit(&self, _request: EditRequest) -> ApiFuture<'_, TaskAccepted> {
            self.requests.fetch_add(1, Ordering::SeqCst);
            let accepted = self.queue(None);
            async move { Ok(accepted) }.boxed()
        }

        fn process_timeline(&self, request: TimelineRequest) -> ApiFuture<'_, TaskAccepted> {
            self.requests.fetch_add(1, Ordering::SeqCst);
            self.timelines.lock().unwrap().push(request);
            let accepted = self.queue(None);
            async move { Ok(accepted) }.boxed()
        }

        fn download(&self, _kind: MediaKind, _name: String, _dest: PathBuf) -> ApiFuture<'_, u64> {
            async { Ok(0) }.boxed()
        }
    }

    fn session(server: Arc<ProxyServer>) -> Editor {
        let config = ClientConfig {
            poll_interval_ms: 5,
            ..ClientConfig::default()
        };
        Editor::new(server, Arc::new(HeadlessPlayer::with_duration(60.0)), config)
    }

    #[tokio::test]
    async fn test_upload_until_proxy_is_listed() {
        let server = Arc::new(ProxyServer::default());
        let editor = session(server.clone());

        let ticket = editor.upload_video("clip.mp4", b"not really a video".to_vec()).await.unwrap();
        assert_eq!(ticket.task_id, "T1");
        assert_eq!(editor.task("T1").unwrap().status, TaskStatus::Pending);

        let outcome = ticket.poll.finished().await;
        assert_eq!(outcome, Some(PollOutcome::Finished(TaskStatus::Success)));

        let library = editor.library();
        assert_eq!(library.originals, vec!["clip.mp4".to_string()]);
        assert_eq!(library.proxies, vec!["proxy_clip.mp4".to_string()]);
    }

    #[tokio::test]
    async fn test_mark_and_submit_timeline() {
        let server = Arc::new(ProxyServer::default());
        let editor = session(server.clone());

        let load = editor.load_video("clip.mp4");
        editor.wait_until_ready(load).await.unwrap();
        editor.on_time_update(2.0);
        editor.set_cut_point(CutPoint::Start);
        editor.on_time_update(7.0);
        editor.set_cut_point(CutPoint::End);
        let clip = editor.add_to_timeline().unwrap();
        assert_eq!(clip.duration, 5.0);

        let ticket = editor.process_timeline().await.unwrap().unwrap();
        ticket.poll.finished().await;

        let timelines = server.timelines.lock().unwrap();
        assert_eq!(timelines[0].clips, vec![clip]);
    }

    #[tokio::test]
    async fn test_empty_timeline_is_not_sent() {
        let server = Arc::new(ProxyServer::default());
        let editor = session(server.clone());

        assert!(editor.process_timeline().await.unwrap().is_none());
        assert_eq!(server.requests(), 0);
    }

    #[tokio::test]
    async fn test_cut_command_waits_for_task() {
        let server = Arc::new(ProxyServer::default());
        let editor = session(server.clone());

        let output = execute(
            &editor,
            Command::Cut {
                filename: "clip.mp4".to_string(),
                start: 0.0,
                end: 5.0,
                wait: true,
            },
        )
        .await
        .unwrap();
        assert_eq!(output, "T1: SUCCESS");
    }

    #[tokio::test]
    async fn test_videos_and_health_commands() {
        let server = Arc::new(ProxyServer::default());
        server.originals.lock().unwrap().push("a.mp4".to_string());
        let editor = session(server.clone());

        let health = execute(&editor, Command::Health).await.unwrap();
        assert_eq!(health, "API is running.");
        let listing = execute(&editor, Command::Videos).await.unwrap();
        assert_eq!(listing, "originals:\n  a.mp4\nproxies:");
    }
}
