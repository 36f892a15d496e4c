// ==========================================
// 套件完成原子性测试
// ==========================================
// 职责: 验证归档/解决提交失败时状态与日志不变、通知发布失败不回滚
// ==========================================


#[cfg(test)]
mod atomicity_test {
    use kitting_station::domain::{
        Activity, ErrorKind, KitArchiveRecord, Lane, ResolutionLogEntry,
    };
    use kitting_station::engine::{
        ActivityStore, KitCatalog, OptionalEventPublisher, ResolveRequest, StartJobRequest,
        StationController, StationError, StationEvent, StationEventPublisher, ValidationOutcome,
    };
    use kitting_station::repository::{ActivityRepository, RepositoryError, RepositoryResult};
    use std::error::Error;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    use crate::test_helpers::{build_station, detection, TestStation};

    // ==========================================
    // 可注入故障的存储
    // ==========================================

    struct FailingStore {
        inner: Arc<ActivityRepository>,
        fail_commit: AtomicBool,
    }

    impl FailingStore {
        fn check_injected(&self) -> RepositoryResult<()> {
            if self.fail_commit.load(Ordering::SeqCst) {
                return Err(RepositoryError::DatabaseTransactionError(
                    "injected failure".to_string(),
                ));
            }
            Ok(())
        }
    }

    impl ActivityStore for FailingStore {
        fn insert_activity(&self, activity: &Activity) -> RepositoryResult<()> {
            self.inner.insert_activity(activity)
        }

        fn find_activity(&self, activity_id: &str) -> RepositoryResult<Option<Activity>> {
            self.inner.find_activity(activity_id)
        }

        fn find_running_by_workstation(
            &self,
            workstation_id: &str,
        ) -> RepositoryResult<Option<Activity>> {
            self.inner.find_running_by_workstation(workstation_id)
        }

        fn update_activity(&self, activity: &Activity) -> RepositoryResult<i64> {
            self.inner.update_activity(activity)
        }

        fn commit_kit_completion(
            &self,
            archive: &KitArchiveRecord,
            activity: &Activity,
            logs: &[ResolutionLogEntry],
        ) -> RepositoryResult<i64> {
            self.check_injected()?;
            self.inner.commit_kit_completion(archive, activity, logs)
        }

        fn commit_resolution(
            &self,
            activity: &Activity,
            logs: &[ResolutionLogEntry],
        ) -> RepositoryResult<i64> {
            self.check_injected()?;
            self.inner.commit_resolution(activity, logs)
        }

        fn list_resolution_logs(
            &self,
            activity_id: &str,
            lane: Lane,
            kit_number: u32,
        ) -> RepositoryResult<Vec<ResolutionLogEntry>> {
            self.inner.list_resolution_logs(activity_id, lane, kit_number)
        }

        fn find_archive(
            &self,
            activity_id: &str,
            lane: Lane,
            kit_number: u32,
        ) -> RepositoryResult<Option<KitArchiveRecord>> {
            self.inner.find_archive(activity_id, lane, kit_number)
        }

        fn list_archives(&self, activity_id: &str) -> RepositoryResult<Vec<KitArchiveRecord>> {
            self.inner.list_archives(activity_id)
        }
    }

    struct BrokenPublisher;

    impl StationEventPublisher for BrokenPublisher {
        fn publish(&self, _event: StationEvent) -> Result<(), Box<dyn Error + Send + Sync>> {
            Err("notification channel closed".into())
        }
    }

    fn start_request() -> StartJobRequest {
        StartJobRequest {
            workstation_id: "5".to_string(),
            kit_name: "刹车套件".to_string(),
            kit_code: "EDP-100".to_string(),
            order_reference: "PO-5".to_string(),
            total_kits: 2,
        }
    }

    fn override_request(lane: Lane) -> ResolveRequest {
        ResolveRequest {
            lane,
            reason: "放行".to_string(),
            validation: Some(Default::default()),
        }
    }

    fn unlock_request(lane: Lane) -> ResolveRequest {
        ResolveRequest {
            lane,
            reason: "误放".to_string(),
            validation: None,
        }
    }

    fn failing_controller(station: &TestStation) -> (StationController, Arc<FailingStore>) {
        let store = Arc::new(FailingStore {
            inner: station.activity_repo.clone(),
            fail_commit: AtomicBool::new(false),
        });
        let controller = StationController::new(
            store.clone() as Arc<dyn ActivityStore>,
            station.template_repo.clone() as Arc<dyn KitCatalog>,
            OptionalEventPublisher::with_publisher(
                station.publisher.clone() as Arc<dyn StationEventPublisher>
            ),
        );
        (controller, store)
    }

    // ==========================================
    // 提交失败
    // ==========================================

    #[test]
    fn test_failed_commit_leaves_state_unchanged() {
        let station = build_station();
        let (controller, store) = failing_controller(&station);
        let activity = controller.start_job(start_request()).unwrap();

        for part in ["卡钳", "螺栓", "螺栓"] {
            controller.submit_detection("5", detection(Lane::A, part)).unwrap();
        }
        let before = controller.current_state("5").unwrap().unwrap();
        station.publisher.clear();

        store.fail_commit.store(true, Ordering::SeqCst);
        let result = controller.submit_validation("5", Lane::A, None);
        assert!(matches!(
            result,
            Err(StationError::Repository(RepositoryError::DatabaseTransactionError(_)))
        ));

        let after = controller.current_state("5").unwrap().unwrap();
        assert_eq!(after, before);
        assert_eq!(after.lane_a.kit_index, 1);
        assert_eq!(after.lane_a.slots["螺栓"].found_qty, 2);
        assert!(controller.list_archives(&activity.activity_id).unwrap().is_empty());
        assert!(station.publisher.names().is_empty());

        // 故障恢复后同一套件可以正常完成
        store.fail_commit.store(false, Ordering::SeqCst);
        let outcome = controller.submit_validation("5", Lane::A, None).unwrap();
        assert!(matches!(outcome, ValidationOutcome::Passed { .. }));
        assert_eq!(controller.list_archives(&activity.activity_id).unwrap().len(), 1);
        assert_eq!(station.publisher.names(), vec!["kit_completed"]);
    }

    #[test]
    fn test_failed_override_keeps_lane_locked() {
        let station = build_station();
        let (controller, store) = failing_controller(&station);
        let activity = controller.start_job(start_request()).unwrap();
        controller.submit_detection("5", detection(Lane::A, "刹车片")).unwrap();

        store.fail_commit.store(true, Ordering::SeqCst);
        let result = controller.resolve_error("5", override_request(Lane::A));
        assert!(result.is_err());

        let after = controller.current_state("5").unwrap().unwrap();
        assert!(after.lane_a.is_locked());
        assert_eq!(after.lane_a.kit_index, 1);
        assert!(controller.list_archives(&activity.activity_id).unwrap().is_empty());
        // 失败的解决不留下任何解决日志
        assert!(station
            .activity_repo
            .list_resolution_logs(&activity.activity_id, Lane::A, 1)
            .unwrap()
            .is_empty());

        // 恢复后重试，归档里只有本次的两条解决记录
        store.fail_commit.store(false, Ordering::SeqCst);
        let outcome = controller.resolve_error("5", override_request(Lane::A)).unwrap();
        assert_eq!(outcome.logged, 2);
        assert!(outcome.completion.is_some());

        let archive = controller
            .archive_detail(&activity.activity_id, Lane::A, 1)
            .unwrap();
        let kinds: Vec<ErrorKind> = archive.resolved_errors.iter().map(|e| e.error_kind).collect();
        assert_eq!(
            kinds,
            vec![ErrorKind::DetectionMismatch, ErrorKind::ValidationMismatch]
        );
        assert_eq!(
            station
                .activity_repo
                .list_resolution_logs(&activity.activity_id, Lane::A, 1)
                .unwrap()
                .len(),
            2
        );
    }

    #[test]
    fn test_failed_unlock_writes_no_log() {
        let station = build_station();
        let (controller, store) = failing_controller(&station);
        let activity = controller.start_job(start_request()).unwrap();
        controller.submit_detection("5", detection(Lane::B, "卡钳")).unwrap();
        let before = controller.current_state("5").unwrap().unwrap();

        store.fail_commit.store(true, Ordering::SeqCst);
        let result = controller.resolve_error("5", unlock_request(Lane::B));
        assert!(matches!(
            result,
            Err(StationError::Repository(RepositoryError::DatabaseTransactionError(_)))
        ));

        let after = controller.current_state("5").unwrap().unwrap();
        assert_eq!(after, before);
        assert!(after.lane_b.is_locked());
        assert!(station
            .activity_repo
            .list_resolution_logs(&activity.activity_id, Lane::B, 1)
            .unwrap()
            .is_empty());

        store.fail_commit.store(false, Ordering::SeqCst);
        let outcome = controller.resolve_error("5", unlock_request(Lane::B)).unwrap();
        assert_eq!(outcome.cleared, 1);
        assert_eq!(
            station
                .activity_repo
                .list_resolution_logs(&activity.activity_id, Lane::B, 1)
                .unwrap()
                .len(),
            1
        );
    }

    // ==========================================
    // 通知失败
    // ==========================================

    #[test]
    fn test_publish_failure_does_not_roll_back() {
        let station = build_station();
        let controller = StationController::new(
            station.activity_repo.clone() as Arc<dyn ActivityStore>,
            station.template_repo.clone() as Arc<dyn KitCatalog>,
            OptionalEventPublisher::with_publisher(Arc::new(BrokenPublisher)),
        );

        let activity = controller.start_job(start_request()).unwrap();
        for part in ["卡钳", "螺栓", "螺栓"] {
            controller.submit_detection("5", detection(Lane::A, part)).unwrap();
        }
        let outcome = controller.submit_validation("5", Lane::A, None).unwrap();
        assert!(matches!(outcome, ValidationOutcome::Passed { .. }));

        let stored = controller.get_activity(&activity.activity_id).unwrap();
        assert_eq!(stored.lane_a.kit_index, 2);
        assert_eq!(stored.history.len(), 1);
        assert_eq!(controller.list_archives(&activity.activity_id).unwrap().len(), 1);
    }
}
