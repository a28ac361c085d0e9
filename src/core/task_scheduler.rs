//! 并发任务的启动与汇合
//!
//! 每个任务独立 spawn，全部结束后才返回；各任务的结果（含 panic）原样交还调用方，
//! 失败策略由调用方在汇合之后显式处理，任务之间不共享可变状态。

use std::future::Future;

use tokio::task::JoinError;

use crate::core::ChatError;

fn join_error(label: &str, err: JoinError) -> ChatError {
    if err.is_cancelled() {
        ChatError::TaskFailed(format!("{label} task aborted"))
    } else {
        ChatError::TaskFailed(format!("{label} task panicked"))
    }
}

/// 同时启动两个独立任务并等待二者都结束
pub async fn join_settled<A, B, FA, FB>(
    first: (&str, FA),
    second: (&str, FB),
) -> (Result<A, ChatError>, Result<B, ChatError>)
where
    A: Send + 'static,
    B: Send + 'static,
    FA: Future<Output = Result<A, ChatError>> + Send + 'static,
    FB: Future<Output = Result<B, ChatError>> + Send + 'static,
{
    let (first_label, first_fut) = first;
    let (second_label, second_fut) = second;
    let first_handle = tokio::spawn(first_fut);
    let second_handle = tokio::spawn(second_fut);

    let (first_res, second_res) = tokio::join!(first_handle, second_handle);
    (
        first_res.unwrap_or_else(|e| Err(join_error(first_label, e))),
        second_res.unwrap_or_else(|e| Err(join_error(second_label, e))),
    )
}

/// 同时启动 N 个同类任务；结果顺序与输入顺序一致
pub async fn join_all_settled<T, F>(tasks: impl IntoIterator<Item = F>) -> Vec<Result<T, ChatError>>
where
    T: Send + 'static,
    F: Future<Output = Result<T, ChatError>> + Send + 'static,
{
    let handles: Vec<_> = tasks.into_iter().map(tokio::spawn).collect();
    let mut results = Vec::with_capacity(handles.len());
    for (idx, handle) in handles.into_iter().enumerate() {
        let label = format!("#{idx}");
        results.push(handle.await.unwrap_or_else(|e| Err(join_error(&label, e))));
    }
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_both_run_concurrently() {
        let started = tokio::time::Instant::now();
        let (a, b) = join_settled(
            ("slow", async {
                tokio::time::sleep(Duration::from_secs(2)).await;
                Ok::<_, ChatError>(1)
            }),
            ("fast", async {
                tokio::time::sleep(Duration::from_secs(1)).await;
                Ok::<_, ChatError>("b")
            }),
        )
        .await;
        assert_eq!(a.unwrap(), 1);
        assert_eq!(b.unwrap(), "b");
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_failure_does_not_affect_sibling() {
        let (a, b) = join_settled(
            ("title", async { Err::<String, _>(ChatError::EmptyTitle) }),
            ("reply", async { Ok::<_, ChatError>("hello".to_string()) }),
        )
        .await;
        assert!(matches!(a, Err(ChatError::EmptyTitle)));
        assert_eq!(b.unwrap(), "hello");
    }

    #[tokio::test]
    async fn test_panic_becomes_task_failed() {
        async fn task(n: u8) -> Result<u8, ChatError> {
            if n == 0 {
                panic!("boom");
            }
            Ok(n)
        }

        let results = join_all_settled(vec![task(1), task(0)]).await;
        assert_eq!(results.len(), 2);
        assert_eq!(*results[0].as_ref().unwrap(), 1);
        assert!(matches!(&results[1], Err(ChatError::TaskFailed(msg)) if msg.contains("panicked")));
    }
}
