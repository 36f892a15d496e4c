// ==========================================
// 数据仓储层测试
// ==========================================
// 职责: 模板查找诊断、乐观锁、运行中唯一约束、解决日志顺序
// ==========================================


#[cfg(test)]
mod repository_test {
    use chrono::Utc;
    use kitting_station::domain::{
        Activity, ActivityStatus, ErrorDetail, ErrorKind, Lane, ResolutionLogEntry,
        ValidationDetail,
    };
    use kitting_station::engine::{ActivityStore, KitCatalog, TemplateLookup};
    use kitting_station::repository::{ActivityRepository, KitTemplateRepository, RepositoryError};

    use crate::test_helpers::{brake_kit_template, create_test_db, detection, single_lane_template};

    fn repos() -> (tempfile::NamedTempFile, ActivityRepository, KitTemplateRepository) {
        let (temp_file, db_path) = create_test_db().unwrap();
        let activity_repo = ActivityRepository::new(&db_path).unwrap();
        let template_repo = KitTemplateRepository::new(&db_path).unwrap();
        template_repo.insert(&brake_kit_template()).unwrap();
        template_repo.insert(&single_lane_template()).unwrap();
        (temp_file, activity_repo, template_repo)
    }

    fn new_activity(id: &str, workstation_id: &str) -> Activity {
        Activity::from_template(
            id.to_string(),
            workstation_id.to_string(),
            "PO-R".to_string(),
            &brake_kit_template(),
            2,
        )
    }

    // ==========================================
    // 模板查找
    // ==========================================

    #[test]
    fn test_template_lookup_diagnostics() {
        let (_tmp, _activity_repo, template_repo) = repos();

        match template_repo.find_kit_template("刹车套件", "EDP-100").unwrap() {
            TemplateLookup::Found(template) => {
                assert_eq!(template.template_id, "TPL-BRAKE");
                assert_eq!(template.lines.len(), 3);
            }
            other => panic!("Expected Found, got {:?}", other),
        }
        assert!(matches!(
            template_repo.find_kit_template("刹车套件", "edp-100").unwrap(),
            TemplateLookup::Found(_)
        ));
        assert_eq!(
            template_repo.find_kit_template("刹车套件", "X").unwrap(),
            TemplateLookup::CodeMismatch {
                kit_name: "刹车套件".to_string()
            }
        );
        assert_eq!(
            template_repo.find_kit_template("X", "EDP-200").unwrap(),
            TemplateLookup::NameMismatch {
                kit_code: "EDP-200".to_string()
            }
        );
        assert_eq!(
            template_repo.find_kit_template("X", "Y").unwrap(),
            TemplateLookup::NotFound
        );

        let stored = template_repo.find_by_id("TPL-BRACKET").unwrap().unwrap();
        assert_eq!(stored, single_lane_template());
        assert_eq!(template_repo.list_all().unwrap().len(), 2);
    }

    // ==========================================
    // 活动文档
    // ==========================================

    #[test]
    fn test_activity_document_roundtrip_and_revision() {
        let (_tmp, repo, _templates) = repos();
        let mut activity = new_activity("ACT-1", "1");
        repo.insert_activity(&activity).unwrap();

        let loaded = repo.find_running_by_workstation("1").unwrap().unwrap();
        assert_eq!(loaded, activity);

        activity.lane_a.slots["螺栓"].found_qty = 1;
        let revision = repo.update_activity(&activity).unwrap();
        assert_eq!(revision, 1);

        let loaded = repo.find_activity("ACT-1").unwrap().unwrap();
        assert_eq!(loaded.revision, 1);
        assert_eq!(loaded.lane_a.slots["螺栓"].found_qty, 1);
    }

    #[test]
    fn test_stale_revision_is_rejected() {
        let (_tmp, repo, _templates) = repos();
        let activity = new_activity("ACT-2", "1");
        repo.insert_activity(&activity).unwrap();

        repo.update_activity(&activity).unwrap();
        let err = repo.update_activity(&activity).unwrap_err();
        assert!(matches!(
            err,
            RepositoryError::OptimisticLockFailure {
                expected: 0,
                actual: 1,
                ..
            }
        ));

        let missing = new_activity("ACT-MISSING", "9");
        assert!(matches!(
            repo.update_activity(&missing),
            Err(RepositoryError::NotFound { .. })
        ));
    }

    #[test]
    fn test_one_running_activity_per_workstation() {
        let (_tmp, repo, _templates) = repos();
        repo.insert_activity(&new_activity("ACT-A", "1")).unwrap();

        let err = repo.insert_activity(&new_activity("ACT-B", "1")).unwrap_err();
        assert!(matches!(err, RepositoryError::UniqueConstraintViolation(_)));

        // 其它工位不受影响
        repo.insert_activity(&new_activity("ACT-C", "2")).unwrap();

        // 结束后可以再次启动
        let mut finished = repo.find_activity("ACT-A").unwrap().unwrap();
        finished.status = ActivityStatus::ManuallyTerminated;
        repo.update_activity(&finished).unwrap();
        repo.insert_activity(&new_activity("ACT-D", "1")).unwrap();

        assert_eq!(repo.list_running().unwrap().len(), 2);
        assert_eq!(repo.list_all().unwrap().len(), 3);
    }

    // ==========================================
    // 解决日志
    // ==========================================

    #[test]
    fn test_resolution_logs_keep_insertion_order() {
        let (_tmp, repo, _templates) = repos();
        repo.insert_activity(&new_activity("ACT-L", "1")).unwrap();

        let resolved_at = Utc::now();
        let entry = |log_id: &str, kit_number: u32, detail: ErrorDetail| ResolutionLogEntry {
            log_id: log_id.to_string(),
            activity_id: "ACT-L".to_string(),
            workstation_id: "1".to_string(),
            lane: Lane::A,
            kit_number,
            error_kind: detail.kind(),
            reason: "放行".to_string(),
            detail,
            resolved_at,
        };

        // 每次解决提交都会推进活动版本
        let mut activity = repo.find_activity("ACT-L").unwrap().unwrap();
        activity.revision = repo
            .commit_resolution(
                &activity,
                &[
                    entry("L-2", 1, ErrorDetail::Detection(detection(Lane::A, "垫圈"))),
                    entry("L-1", 1, ErrorDetail::Validation(ValidationDetail::default())),
                ],
            )
            .unwrap();
        assert_eq!(activity.revision, 1);
        repo.commit_resolution(
            &activity,
            &[entry("L-3", 2, ErrorDetail::Detection(detection(Lane::A, "扳手")))],
        )
        .unwrap();

        let logs = repo.list_resolution_logs("ACT-L", Lane::A, 1).unwrap();
        let ids: Vec<&str> = logs.iter().map(|l| l.log_id.as_str()).collect();
        assert_eq!(ids, vec!["L-2", "L-1"]);
        assert_eq!(logs[1].error_kind, ErrorKind::ValidationMismatch);
        assert!(repo.list_resolution_logs("ACT-L", Lane::B, 1).unwrap().is_empty());
    }

    #[test]
    fn test_stale_resolution_commit_writes_no_log() {
        let (_tmp, repo, _templates) = repos();
        let activity = new_activity("ACT-S", "1");
        repo.insert_activity(&activity).unwrap();
        repo.update_activity(&activity).unwrap();

        // 版本已过期：日志随活动更新一起回滚
        let log = ResolutionLogEntry {
            log_id: "L-STALE".to_string(),
            activity_id: "ACT-S".to_string(),
            workstation_id: "1".to_string(),
            lane: Lane::A,
            kit_number: 1,
            error_kind: ErrorKind::DetectionMismatch,
            reason: "放行".to_string(),
            detail: ErrorDetail::Detection(detection(Lane::A, "垫圈")),
            resolved_at: Utc::now(),
        };
        let err = repo.commit_resolution(&activity, &[log]).unwrap_err();
        assert!(matches!(err, RepositoryError::OptimisticLockFailure { .. }));
        assert!(repo.list_resolution_logs("ACT-S", Lane::A, 1).unwrap().is_empty());
    }
}
